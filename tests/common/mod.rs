#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::net::IpAddr;
use std::rc::Rc;
use std::time::Duration;

use dut_harness_lib::reachability::{Clock, ReachabilityProbe};
use dut_harness_lib::serial::{PortBackend, SerialError};

pub const DUT: &str = "192.168.1.10";

pub fn dut() -> IpAddr {
    DUT.parse().unwrap()
}

/// Serial backend replaying canned replies and recording every command
#[derive(Debug, Default)]
pub struct ScriptedPort {
    pub replies: VecDeque<Vec<u8>>,
    pub written: Vec<String>,
    pub open: bool,
    pub open_sessions: i32,
    pub max_open_sessions: i32,
    pub opens: u32,
    pub closes: u32,
    pub fail_open: bool,
    pub fail_write: bool,
    pub fail_clear: bool,
    pub stuck_open: bool,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|reply| reply.as_bytes().to_vec()).collect(),
            ..Self::default()
        }
    }

    pub fn with_raw_reply(reply: &[u8]) -> Self {
        Self {
            replies: VecDeque::from(vec![reply.to_vec()]),
            ..Self::default()
        }
    }

    pub fn missing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn stuck(mut self) -> Self {
        self.stuck_open = true;
        self
    }

    pub fn broken_writes(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub fn broken_clear(mut self) -> Self {
        self.fail_clear = true;
        self
    }

    fn not_open() -> SerialError {
        SerialError::IoError(io::Error::new(io::ErrorKind::NotConnected, "port not open"))
    }
}

impl PortBackend for ScriptedPort {
    fn port_name(&self) -> &str {
        "/dev/ttyUSB0"
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), SerialError> {
        if self.fail_open {
            return Err(SerialError::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            )));
        }
        if self.open {
            return Err(SerialError::IoError(io::Error::new(
                io::ErrorKind::AddrInUse,
                "device busy",
            )));
        }
        self.open = true;
        self.opens += 1;
        self.open_sessions += 1;
        self.max_open_sessions = self.max_open_sessions.max(self.open_sessions);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SerialError> {
        self.closes += 1;
        if self.stuck_open {
            return Ok(());
        }
        if self.open {
            self.open = false;
            self.open_sessions -= 1;
        }
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), SerialError> {
        if !self.open {
            return Err(Self::not_open());
        }
        if self.fail_clear {
            return Err(SerialError::IoError(io::Error::new(
                io::ErrorKind::Other,
                "purge failed",
            )));
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        if !self.open {
            return Err(Self::not_open());
        }
        if self.fail_write {
            return Err(SerialError::IoError(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write failed",
            )));
        }
        self.written.push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, SerialError> {
        if !self.open {
            return Err(Self::not_open());
        }
        // Anything after the delimiter is dropped, as the next open clears
        // the input buffer anyway
        let reply = self.replies.pop_front().unwrap_or_default();
        let line = match reply.iter().position(|&b| b == delimiter) {
            Some(end) => reply[..=end].to_vec(),
            None => reply,
        };
        Ok(line)
    }
}

/// Virtual time advanced only by sleeps and probe costs
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    now: Rc<Cell<Duration>>,
    sleeps: Rc<Cell<u32>>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
    }
}

type Outcome = Box<dyn FnMut(Duration, u32) -> io::Result<bool>>;

/// Probe whose answer depends on the simulated time of each call
pub struct ScriptedProbe {
    clock: SimulatedClock,
    outcome: Outcome,
    pub calls: u32,
    pub timeouts: Vec<Duration>,
}

impl ScriptedProbe {
    pub fn new(
        clock: &SimulatedClock,
        outcome: impl FnMut(Duration, u32) -> io::Result<bool> + 'static,
    ) -> Self {
        Self {
            clock: clock.clone(),
            outcome: Box::new(outcome),
            calls: 0,
            timeouts: Vec::new(),
        }
    }

    pub fn always(clock: &SimulatedClock, reachable: bool) -> Self {
        Self::new(clock, move |_, _| Ok(reachable))
    }

    /// Answers until `until`, silent from then on
    pub fn up_until(clock: &SimulatedClock, until: Duration) -> Self {
        Self::new(clock, move |now, _| Ok(now < until))
    }

    /// Silent until `from`, answers from then on
    pub fn up_from(clock: &SimulatedClock, from: Duration) -> Self {
        Self::new(clock, move |now, _| Ok(now >= from))
    }

    /// Behaves like `reachable` until call number `call` errors
    pub fn failing_on(clock: &SimulatedClock, call: u32, reachable: bool) -> Self {
        Self::new(clock, move |_, n| {
            if n == call {
                Err(io::Error::new(io::ErrorKind::NotFound, "ping: command not found"))
            } else {
                Ok(reachable)
            }
        })
    }
}

impl ReachabilityProbe for ScriptedProbe {
    fn probe(&mut self, _host: IpAddr, timeout: Duration) -> io::Result<bool> {
        self.calls += 1;
        self.timeouts.push(timeout);
        (self.outcome)(self.clock.now(), self.calls)
    }
}
