//! Answer Channel
//!
//! Single-slot mailbox used to hand one typed value from the host thread back
//! to a compute thread that is blocked waiting for it.
//!
//! Slot layout (all little-endian):
//!
//! ```text
//! offset 0   u32 state   0 = WAITING, 1 = DONE, 2 = FAULT
//! offset 4   payload     int:   low u32, high u32
//!                        float: f64
//!                        bytes: u32 length, then raw bytes
//! ```
//!
//! Protocol:
//! - the compute side arms the slot (state = WAITING) *before* posting the
//!   request, so the host always observes WAITING when it answers and never
//!   has to wait on the compute thread;
//! - the host claims the slot with a WAITING -> WRITING exchange, writes the
//!   payload under the slot mutex, publishes DONE with release ordering and
//!   wakes the waiter;
//! - the compute side observes DONE with acquire ordering, then locks the
//!   payload to decode it.
//!
//! The payload mutex is only held to copy bytes in or out, so the host never
//! waits on the compute thread for longer than one copy.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{AnswerConfig, WaitStrategy};
use crate::core::error::{AnswerError, AnswerResult};
use crate::core::utils::duration_ms;

pub const STATE_WAITING: u32 = 0;
pub const STATE_DONE: u32 = 1;
pub const STATE_FAULT: u32 = 2;
/// Host is copying the payload; never visible to a successful reader.
const STATE_WRITING: u32 = 3;

/// Byte offset of the payload region inside the slot.
pub const PAYLOAD_OFFSET: usize = 4;
/// Size of the length prefix of a bytes answer.
const LENGTH_PREFIX: usize = 4;

/// Declared type of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerType {
    Int,
    Float,
    Bool,
    Bytes,
}

impl AnswerType {
    pub fn name(self) -> &'static str {
        match self {
            AnswerType::Int => "int",
            AnswerType::Float => "float",
            AnswerType::Bool => "bool",
            AnswerType::Bytes => "bytes",
        }
    }
}

/// A decoded answer value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Answer {
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Answer {
    pub fn answer_type(&self) -> AnswerType {
        match self {
            Answer::Int(_) => AnswerType::Int,
            Answer::Float(_) => AnswerType::Float,
            Answer::Bool(_) => AnswerType::Bool,
            Answer::Bytes(_) => AnswerType::Bytes,
        }
    }

    /// Fails with `TypeMismatch` unless this answer has the declared type.
    pub fn check(&self, expected: AnswerType) -> AnswerResult<()> {
        let actual = self.answer_type();
        if actual == expected {
            Ok(())
        } else {
            Err(AnswerError::TypeMismatch {
                expected: expected.name(),
                actual: actual.name(),
            })
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Answer::Int(v) => Some(v),
            Answer::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Answer::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Answer::Bool(b) => Some(b),
            Answer::Int(v) => Some(v != 0),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Answer::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Single-slot synchronous reply mailbox shared by exactly one host thread
/// and one compute thread.
pub struct AnswerChannel {
    state: AtomicU32,
    /// Set by the compute side between arming the slot and consuming the reply.
    in_flight: AtomicBool,
    /// Payload region; also the mutex the waiter parks on.
    payload: Mutex<Box<[u8]>>,
    capacity: usize,
    wake: Condvar,
    strategy: WaitStrategy,
    slow_wait_warning: Duration,
    timeout: Option<Duration>,
}

impl AnswerChannel {
    pub fn new(config: &AnswerConfig) -> Self {
        Self {
            // Idle: no request armed yet.
            state: AtomicU32::new(STATE_DONE),
            in_flight: AtomicBool::new(false),
            payload: Mutex::new(vec![0u8; config.capacity_bytes].into_boxed_slice()),
            capacity: config.capacity_bytes,
            wake: Condvar::new(),
            strategy: config.wait,
            slow_wait_warning: config.slow_wait_warning(),
            timeout: config.timeout(),
        }
    }

    /// Payload region size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest bytes answer that fits in the slot.
    pub fn max_bytes_len(&self) -> usize {
        self.capacity().saturating_sub(LENGTH_PREFIX)
    }

    pub fn state(&self) -> u32 {
        self.state.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Compute side
    // ------------------------------------------------------------------

    /// Arms the slot for a new request. Must happen before the request is
    /// posted to the host.
    pub fn begin_request(&self) -> AnswerResult<()> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A previous wait timed out. If its reply has landed since, it is
            // stale and can be discarded; otherwise the host still owes us.
            match self.state.load(Ordering::Acquire) {
                STATE_DONE | STATE_FAULT => {
                    tracing::warn!(target: "bridge::answer", "Discarding late reply of an abandoned request");
                }
                _ => return Err(AnswerError::RequestInFlight),
            }
        }
        self.state.store(STATE_WAITING, Ordering::Release);
        Ok(())
    }

    /// Blocks until the host answers the armed request and decodes the value.
    pub fn wait_answer(&self, ty: AnswerType) -> AnswerResult<Answer> {
        let state = self.wait_settled()?;
        let payload = self.lock_payload();
        let result = if state == STATE_FAULT {
            let message = read_bytes(&payload);
            Err(AnswerError::HostFault(String::from_utf8_lossy(&message).into_owned()))
        } else {
            Ok(decode(&payload, ty))
        };
        drop(payload);
        self.in_flight.store(false, Ordering::Release);
        result
    }

    /// Arms the slot, runs `post` (which must deliver the request to the host)
    /// and blocks for the typed reply.
    pub fn request<E, F>(&self, ty: AnswerType, post: F) -> Result<Answer, E>
    where
        F: FnOnce() -> Result<(), E>,
        E: From<AnswerError>,
    {
        self.begin_request()?;
        if let Err(e) = post() {
            self.in_flight.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(self.wait_answer(ty)?)
    }

    fn wait_settled(&self) -> AnswerResult<u32> {
        let start = Instant::now();
        let mut next_warning = self.slow_wait_warning;

        let settled = |s: u32| s == STATE_DONE || s == STATE_FAULT;

        match self.strategy {
            WaitStrategy::Blocking => {
                let mut guard = self.lock_payload();
                loop {
                    let s = self.state.load(Ordering::Acquire);
                    if settled(s) {
                        return Ok(s);
                    }
                    let elapsed = start.elapsed();
                    self.check_timeout(elapsed)?;
                    self.warn_if_slow(elapsed, &mut next_warning);

                    let mut slice = next_warning.saturating_sub(elapsed);
                    if let Some(timeout) = self.timeout {
                        slice = slice.min(timeout.saturating_sub(elapsed));
                    }
                    let slice = slice.max(Duration::from_millis(1));
                    guard = self
                        .wake
                        .wait_timeout(guard, slice)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
            WaitStrategy::Polling { interval_ms } => {
                let interval = Duration::from_millis(interval_ms);
                loop {
                    let s = self.state.load(Ordering::Acquire);
                    if settled(s) {
                        return Ok(s);
                    }
                    let elapsed = start.elapsed();
                    self.check_timeout(elapsed)?;
                    self.warn_if_slow(elapsed, &mut next_warning);
                    std::thread::sleep(interval);
                }
            }
        }
    }

    fn check_timeout(&self, elapsed: Duration) -> AnswerResult<()> {
        match self.timeout {
            Some(timeout) if elapsed >= timeout => Err(AnswerError::TimedOut(duration_ms(timeout))),
            _ => Ok(()),
        }
    }

    fn warn_if_slow(&self, elapsed: Duration, next_warning: &mut Duration) {
        if elapsed >= *next_warning {
            tracing::warn!(
                target: "bridge::answer",
                waited_ms = duration_ms(elapsed),
                "Still waiting for the host to answer"
            );
            *next_warning += self.slow_wait_warning;
        }
    }

    fn lock_payload(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.payload.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Host side
    // ------------------------------------------------------------------

    /// Writes `answer` into the slot and wakes the waiting compute thread.
    ///
    /// Fails with `NotWaiting` if no request is armed; that is a protocol
    /// violation and the caller should treat it as fatal.
    pub fn send(&self, answer: &Answer) -> AnswerResult<()> {
        if let Answer::Bytes(bytes) = answer {
            if bytes.len() > self.max_bytes_len() {
                return Err(AnswerError::PayloadTooLarge {
                    len: bytes.len(),
                    capacity: self.max_bytes_len(),
                });
            }
        }
        self.publish(STATE_DONE, |payload| match answer {
            Answer::Int(v) => write_int(payload, *v),
            Answer::Bool(b) => write_int(payload, *b as i64),
            Answer::Float(f) => write_int(payload, f.to_bits() as i64),
            Answer::Bytes(bytes) => write_bytes(payload, bytes),
        })
    }

    /// Reports a failed request to the waiting compute thread. Long messages
    /// are truncated to the slot capacity.
    pub fn send_fault(&self, message: &str) -> AnswerResult<()> {
        let max = self.max_bytes_len();
        let mut end = message.len().min(max);
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &message.as_bytes()[..end];
        self.publish(STATE_FAULT, |payload| write_bytes(payload, bytes))
    }

    fn publish<F>(&self, final_state: u32, write: F) -> AnswerResult<()>
    where
        F: FnOnce(&mut [u8]),
    {
        if let Err(state) = self.state.compare_exchange(
            STATE_WAITING,
            STATE_WRITING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(AnswerError::NotWaiting { state });
        }

        let mut payload = self.lock_payload();
        write(&mut payload);
        self.state.store(final_state, Ordering::Release);
        self.wake.notify_one();
        Ok(())
    }
}

impl std::fmt::Debug for AnswerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerChannel")
            .field("state", &self.state())
            .field("in_flight", &self.is_in_flight())
            .field("capacity", &self.capacity())
            .field("strategy", &self.strategy)
            .finish()
    }
}

fn decode(payload: &[u8], ty: AnswerType) -> Answer {
    match ty {
        AnswerType::Int => Answer::Int(read_int(payload)),
        AnswerType::Bool => Answer::Bool(read_int(payload) != 0),
        AnswerType::Float => Answer::Float(f64::from_bits(read_int(payload) as u64)),
        AnswerType::Bytes => Answer::Bytes(read_bytes(payload)),
    }
}

fn read_int(payload: &[u8]) -> i64 {
    let low = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let high = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    ((high as u64) << 32 | low as u64) as i64
}

fn read_bytes(payload: &[u8]) -> Vec<u8> {
    let len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let end = (LENGTH_PREFIX + len).min(payload.len());
    payload[LENGTH_PREFIX..end].to_vec()
}

fn write_int(payload: &mut [u8], value: i64) {
    let bits = value as u64;
    payload[0..4].copy_from_slice(&(bits as u32).to_le_bytes());
    payload[4..8].copy_from_slice(&((bits >> 32) as u32).to_le_bytes());
}

fn write_bytes(payload: &mut [u8], bytes: &[u8]) {
    payload[0..LENGTH_PREFIX].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
    payload[LENGTH_PREFIX..LENGTH_PREFIX + bytes.len()].copy_from_slice(bytes);
}
