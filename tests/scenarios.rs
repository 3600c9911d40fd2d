//! The six end-to-end scenarios from the design's "Testable properties"
//! section, exercised against the public API rather than from inside
//! any one module's unit tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cimba::event::{self, Tag};
use cimba::process::Process;
use cimba::resource::{Buffer, Resource};
use cimba::thread_state;

fn reset(start: f64) {
    thread_state::teardown_thread_state();
    thread_state::init_thread_state(start);
}

// S1 — ordering at equal time: three events at t=5 with priorities
// 1, 3, 2 (scheduled in that order) must fire 3, 2, 1.
#[test]
fn s1_priority_breaks_equal_time_ties() {
    reset(0.0);
    // An `Action` is a plain `fn` pointer (so the event heap's payload
    // stays `Copy`), so the observation is routed through a thread-local
    // the action reads instead of a captured closure.
    thread_local! {
        static ORDER: RefCell<Vec<i64>> = const { RefCell::new(Vec::new()) };
    }
    fn push(subject: Tag, _object: Tag) {
        ORDER.with(|o| o.borrow_mut().push(subject as i64));
    }
    ORDER.with(|o| o.borrow_mut().clear());

    event::schedule(push, 1, 0, 5.0, 1);
    event::schedule(push, 2, 0, 5.0, 3);
    event::schedule(push, 3, 0, 5.0, 2);
    event::execute();

    assert_eq!(ORDER.with(|o| o.borrow().clone()), vec![2, 3, 1]);
    thread_state::teardown_thread_state();
}

// S2 — FIFO at equal time and priority: A, B, C scheduled in that order
// must fire in that order.
#[test]
fn s2_fifo_breaks_full_ties() {
    reset(0.0);
    thread_local! {
        static ORDER: RefCell<Vec<i64>> = const { RefCell::new(Vec::new()) };
    }
    fn push(subject: Tag, _object: Tag) {
        ORDER.with(|o| o.borrow_mut().push(subject as i64));
    }
    ORDER.with(|o| o.borrow_mut().clear());

    event::schedule(push, 100, 0, 5.0, 1);
    event::schedule(push, 101, 0, 5.0, 1);
    event::schedule(push, 102, 0, 5.0, 1);
    event::execute();

    assert_eq!(ORDER.with(|o| o.borrow().clone()), vec![100, 101, 102]);
    thread_state::teardown_thread_state();
}

// S3 — hold/interrupt: P holds 10.0 at t=0; at t=3 another process
// interrupts it with 42. `hold` must return 42 at t=3, and the t=10
// wakeup must never fire.
#[test]
fn s3_interrupt_preempts_hold() {
    reset(0.0);
    let observed = Rc::new(Cell::new(None));
    let obs2 = observed.clone();
    let holder = Process::new("holder", 0, 0, move |_p, _ctx| {
        let sig = Process::hold(10.0);
        obs2.set(Some((event::now(), sig)));
        0
    });
    holder.start();

    let target = holder.clone();
    let interrupter = Process::new("interrupter", 0, 0, move |_p, _ctx| {
        Process::hold(3.0); // wait until t=3 before delivering the interrupt
        target.interrupt(42, 0);
        0
    });
    interrupter.start();

    event::execute();
    assert_eq!(observed.get(), Some((3.0, 42)));
    assert!(holder.is_finished());
    thread_state::teardown_thread_state();
}

// S4 — resource priority: L (pri=1) and H (pri=5) both wait on a
// capacity-1 resource held by O; when O releases, H must acquire next.
#[test]
fn s4_resource_priority() {
    reset(0.0);
    let r = Rc::new(Resource::new("r"));

    let r_o = r.clone();
    let owner = Process::new("owner", 0, 0, move |_p, _ctx| {
        r_o.acquire();
        0
    });
    owner.start();
    event::execute();
    assert!(r.is_held());

    let order = Rc::new(RefCell::new(Vec::new()));
    let r_l = r.clone();
    let order_l = order.clone();
    let low = Process::new("L", 1, 0, move |_p, _ctx| {
        r_l.acquire();
        order_l.borrow_mut().push("L");
        0
    });
    low.start();
    event::execute();

    let r_h = r.clone();
    let order_h = order.clone();
    let high = Process::new("H", 5, 0, move |_p, _ctx| {
        r_h.acquire();
        order_h.borrow_mut().push("H");
        0
    });
    high.start();
    event::execute();

    assert_eq!(r.queue_len(), 2);
    r.release();
    event::execute();

    assert_eq!(order.borrow().as_slice(), &["H"]);
    assert_eq!(r.queue_len(), 1);
    thread_state::teardown_thread_state();
}

// S5 — buffer back-pressure: capacity 2; three unit puts without
// delay, third blocks; then three unit gets. Length history must read
// 0, 1, 2, 2, 1, 2, 1, 0 — the leading 0 is the length when recording
// started, the blocked third `put` samples its own unchanged length
// (2), and its eventual grant (also 2) happens inside the first `get`
// that makes room for it (see `resource::buffer`'s unit test).
#[test]
fn s5_buffer_back_pressure() {
    reset(0.0);
    let buf = Rc::new(Buffer::new("b", 2));
    buf.set_recording(true);

    let buf_p = buf.clone();
    let producer = Process::new("producer", 0, 0, move |_p, _ctx| {
        buf_p.put(1);
        buf_p.put(1);
        buf_p.put(1);
        0
    });
    producer.start();
    event::execute();
    assert_eq!(buf.length(), 2);
    assert_eq!(buf.front_queue_len(), 1);

    let buf_c = buf.clone();
    let consumer = Process::new("consumer", 0, 0, move |_p, _ctx| {
        buf_c.get(1);
        buf_c.get(1);
        buf_c.get(1);
        0
    });
    consumer.start();
    event::execute();

    let values: Vec<i64> = buf.base().history().iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![0, 1, 2, 2, 1, 2, 1, 0]);
    assert_eq!(buf.length(), 0);
    thread_state::teardown_thread_state();
}

// S6 — cancellation: event E scheduled at t=100; cancelled at t=10.
// `execute()` from then must never invoke E, and `is_scheduled` must
// report false.
#[test]
fn s6_cancellation_prevents_firing() {
    reset(0.0);
    thread_local! {
        static FIRED: Cell<bool> = const { Cell::new(false) };
    }
    fn mark(_subject: Tag, _object: Tag) {
        FIRED.with(|f| f.set(true));
    }
    FIRED.with(|f| f.set(false));

    fn noop(_subject: Tag, _object: Tag) {}
    let e = event::schedule(mark, 0, 0, 100.0, 0);
    event::schedule(noop, 0, 0, 10.0, 0);
    event::execute_next(); // advance `now` to 10.0, as in the scenario
    assert_eq!(event::now(), 10.0);

    assert!(event::is_scheduled(e));
    assert!(event::cancel(e));
    assert!(!event::is_scheduled(e));

    event::execute();
    assert!(!FIRED.with(|f| f.get()));
    thread_state::teardown_thread_state();
}
