/// Test doubles simulating a shared CAN bus and a manual clock during
/// integration tests.
use embassy_time::Instant;
use n2k_node::protocol::managment::network_discovering::MessageObserver;
use n2k_node::protocol::managment::network_manager::NetworkManager;
use n2k_node::protocol::messages::N2kMessage;
use n2k_node::protocol::transport::can_frame::CanFrame;
use n2k_node::protocol::transport::traits::{can_bus::CanBus, clock::Clock};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Default)]
struct Wire {
    inboxes: Vec<VecDeque<CanFrame>>,
    logs: Vec<Vec<CanFrame>>,
}

#[derive(Clone)]
#[allow(dead_code)]
/// One endpoint of an in-memory bus. Frames sent by an endpoint reach every
/// other endpoint and are kept in its own log.
pub struct MockCanBus {
    index: usize,
    wire: Rc<RefCell<Wire>>,
}

#[allow(dead_code)]
impl MockCanBus {
    /// `count` endpoints sharing one bus.
    pub fn network(count: usize) -> Vec<Self> {
        let wire = Rc::new(RefCell::new(Wire {
            inboxes: vec![VecDeque::new(); count],
            logs: vec![Vec::new(); count],
        }));
        (0..count)
            .map(|index| Self {
                index,
                wire: wire.clone(),
            })
            .collect()
    }

    /// Build two interconnected endpoints (device ↔ host).
    pub fn create_pair() -> (Self, Self) {
        let mut buses = Self::network(2);
        let host = buses.remove(1);
        (buses.remove(0), host)
    }

    /// Queue a frame for this endpoint only, as if another node sent it.
    pub fn inject(&self, frame: CanFrame) {
        self.wire.borrow_mut().inboxes[self.index].push_back(frame);
    }

    /// Frames this endpoint sent since the last call.
    pub fn take_sent(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.wire.borrow_mut().logs[self.index])
    }

    pub fn has_pending(&self) -> bool {
        !self.wire.borrow().inboxes[self.index].is_empty()
    }
}

impl CanBus for MockCanBus {
    type Error = ();

    fn send_frame(&mut self, frame: &CanFrame, _wait_sent: bool) -> Result<(), Self::Error> {
        let mut wire = self.wire.borrow_mut();
        wire.logs[self.index].push(frame.clone());
        for (index, inbox) in wire.inboxes.iter_mut().enumerate() {
            if index != self.index {
                inbox.push_back(frame.clone());
            }
        }
        Ok(())
    }

    fn recv_frame(&mut self) -> Result<Option<CanFrame>, Self::Error> {
        Ok(self.wire.borrow_mut().inboxes[self.index].pop_front())
    }
}

#[derive(Clone)]
#[allow(dead_code)]
/// Manual monotonic clock shared by every node of a test.
pub struct MockClock(Rc<Cell<Instant>>);

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(Instant::from_millis(0))))
    }

    pub fn set_ms(&self, ms: u64) {
        self.0.set(Instant::from_millis(ms));
    }

    pub fn advance_ms(&self, ms: u64) {
        self.0.set(self.0.get() + embassy_time::Duration::from_millis(ms));
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.0.get()
    }
}

/// Node type used by the scenarios.
pub type TestNode<O = ()> = NetworkManager<MockCanBus, MockClock, O>;

#[allow(dead_code)]
/// A node of a scenario, whatever its observer.
pub trait Participant {
    /// One poll; the application message it completed, if any.
    fn step(&mut self) -> Option<N2kMessage>;
    fn has_pending(&mut self) -> bool;
}

impl<O: MessageObserver> Participant for TestNode<O> {
    fn step(&mut self) -> Option<N2kMessage> {
        self.poll().expect("mock bus never fails")
    }

    fn has_pending(&mut self) -> bool {
        self.bus_mut().has_pending()
    }
}

#[allow(dead_code)]
/// Poll every node until no frame is left in flight. Returns the application
/// messages each node received.
pub fn settle(nodes: &mut [&mut dyn Participant]) -> Vec<Vec<N2kMessage>> {
    let mut delivered = vec![Vec::new(); nodes.len()];
    // Each node gets one poll per round, even with nothing queued, so its
    // timers run.
    loop {
        for (node, received) in nodes.iter_mut().zip(delivered.iter_mut()) {
            if let Some(message) = node.step() {
                received.push(message);
            }
        }
        if nodes.iter_mut().all(|node| !node.has_pending()) {
            return delivered;
        }
    }
}
