use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Strategy for initializing the sequence number
pub trait SequenceStrategy {
    fn next_sequence(current: u16, rng: &mut StdRng) -> u16;
    fn reset_sequence(rng: &mut StdRng) -> u16;
}

/// Strategy: Always start sequence at 0
pub struct ZeroSequence;
impl SequenceStrategy for ZeroSequence {
    fn next_sequence(current: u16, _rng: &mut StdRng) -> u16 {
        (current + 1) & 0x1FFF
    }
    fn reset_sequence(_rng: &mut StdRng) -> u16 {
        0
    }
}

/// Strategy: Start sequence at random value
pub struct RandomSequence;
impl SequenceStrategy for RandomSequence {
    fn next_sequence(current: u16, _rng: &mut StdRng) -> u16 {
        (current + 1) & 0x1FFF
    }
    fn reset_sequence(rng: &mut StdRng) -> u16 {
        rng.random::<u16>() & 0x1FFF
    }
}

/// A 64-bit Snowflake ID generator used for product, bid and order ids.
/// Structure:
/// - 44 bits: Timestamp (milliseconds)
/// - 7 bits: Machine ID (128 machines)
/// - 13 bits: Sequence (8192 IDs/ms)
///
/// The generator sits behind a mutex in shared state, so it carries an
/// owned `StdRng` rather than the thread-local handle.
pub struct SnowflakeGen<S: SequenceStrategy> {
    machine_id: u8,
    last_ts: u64,
    sequence: u16,
    rng: StdRng,
    _marker: std::marker::PhantomData<S>,
}

pub type SnowflakeGenRng = SnowflakeGen<RandomSequence>;

impl<S: SequenceStrategy> SnowflakeGen<S> {
    pub fn new(machine_id: u8) -> Self {
        // Ensure machine_id fits in 7 bits
        let machine_id = machine_id & 0x7F;
        Self {
            machine_id,
            last_ts: 0,
            sequence: 0,
            rng: StdRng::from_os_rng(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn generate(&mut self) -> u64 {
        let mut now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(std::time::Duration::ZERO)
            .as_millis() as u64;

        if now < self.last_ts {
            now = self.last_ts;
        }

        if now == self.last_ts {
            self.sequence = S::next_sequence(self.sequence, &mut self.rng);
            if self.sequence == 0 {
                // Overflow: Move to next millisecond immediately
                self.last_ts += 1;
                now = self.last_ts;
                self.sequence = S::reset_sequence(&mut self.rng);
            }
        } else {
            // New millisecond
            self.sequence = S::reset_sequence(&mut self.rng);
        }

        self.last_ts = now;
        // TS (44) | Machine (7) | Seq (13)
        (now << 20) | ((self.machine_id as u64) << 13) | (self.sequence as u64)
    }

    pub fn timestamp_ms(val: u64) -> u64 {
        val >> 20
    }

    pub fn machine_id(val: u64) -> u8 {
        ((val >> 13) & 0x7F) as u8
    }

    pub fn sequence(val: u64) -> u16 {
        (val & 0x1FFF) as u16
    }
}
