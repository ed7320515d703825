//! HX711 load-cell ADC driver.
//!
//! Bit-banged over two GPIOs (DOUT input, PD_SCK output) using the
//! `embedded-hal` 1.0 traits, so the same driver runs on `esp-idf-hal` pins
//! and on test doubles.
//!
//! Each conversion is 24 bits, MSB first, two's complement. The number of
//! extra clock pulses after the data bits selects channel and gain for the
//! *next* conversion.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::sampler::{LoadCell, SensorError};

/// How long each sub-read of an average waits for the converter.
const SUB_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Holding PD_SCK high longer than this powers the chip down.
const POWER_DOWN_HOLD_US: u32 = 70;

/// Channel and gain selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gain {
    /// Channel A, gain 128.
    A128,
    /// Channel B, gain 32.
    B32,
    /// Channel A, gain 64.
    #[default]
    A64,
}

impl Gain {
    fn extra_pulses(self) -> u8 {
        match self {
            Gain::A128 => 1,
            Gain::B32 => 2,
            Gain::A64 => 3,
        }
    }
}

/// HX711 on a DOUT/PD_SCK pin pair.
pub struct Hx711<DOUT, SCK, D> {
    dout: DOUT,
    sck: SCK,
    delay: D,
    gain: Gain,
}

impl<DOUT, SCK, D> Hx711<DOUT, SCK, D>
where
    DOUT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    pub fn new(dout: DOUT, sck: SCK, delay: D, gain: Gain) -> Self {
        Self {
            dout,
            sck,
            delay,
            gain,
        }
    }

    /// Power the chip up and program the configured gain.
    ///
    /// The gain only takes effect through the pulses of a conversion, so this
    /// waits for one and discards it.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.power_down(false)?;
        self.set_gain(self.gain)
    }

    /// Select channel and gain for subsequent conversions.
    pub fn set_gain(&mut self, gain: Gain) -> Result<(), SensorError> {
        self.gain = gain;
        self.wait(SUB_READ_TIMEOUT)?;
        self.read_data().map(|_| ())
    }

    pub fn power_down(&mut self, down: bool) -> Result<(), SensorError> {
        if down {
            self.sck.set_high().map_err(pin_error)?;
            self.delay.delay_us(POWER_DOWN_HOLD_US);
        } else {
            self.sck.set_low().map_err(pin_error)?;
        }
        Ok(())
    }

    /// DOUT goes low when a conversion is ready.
    pub fn is_ready(&mut self) -> Result<bool, SensorError> {
        self.dout.is_low().map_err(pin_error)
    }

    /// Poll readiness about once per millisecond until `timeout` has elapsed.
    ///
    /// The deadline is measured on the clock, not by counting polls: an RTOS
    /// delay may round each millisecond up to a whole scheduler tick.
    pub fn wait(&mut self, timeout: Duration) -> Result<(), SensorError> {
        let started = Instant::now();
        loop {
            if self.is_ready()? {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(SensorError::NotReady(timeout));
            }
            self.delay.delay_ms(1);
        }
    }

    /// Clock out one conversion. The caller must have waited for readiness.
    pub fn read_data(&mut self) -> Result<i32, SensorError> {
        let mut raw = 0u32;
        for _ in 0..24 {
            self.sck.set_high().map_err(pin_error)?;
            self.delay.delay_us(1);
            let bit = self.dout.is_high().map_err(pin_error)?;
            raw = (raw << 1) | u32::from(bit);
            self.sck.set_low().map_err(pin_error)?;
            self.delay.delay_us(1);
        }

        for _ in 0..self.gain.extra_pulses() {
            self.sck.set_high().map_err(pin_error)?;
            self.delay.delay_us(1);
            self.sck.set_low().map_err(pin_error)?;
            self.delay.delay_us(1);
        }

        Ok(sign_extend_24(raw))
    }

    /// Mean of `times` conversions, each preceded by a readiness wait.
    pub fn read_average(&mut self, times: u8) -> Result<i32, SensorError> {
        if times == 0 {
            return Err(SensorError::InvalidSampleCount(times));
        }
        let mut sum = 0i64;
        for _ in 0..times {
            self.wait(SUB_READ_TIMEOUT)?;
            sum += i64::from(self.read_data()?);
        }
        Ok((sum / i64::from(times)) as i32)
    }
}

impl<DOUT, SCK, D> LoadCell for Hx711<DOUT, SCK, D>
where
    DOUT: InputPin,
    SCK: OutputPin,
    D: DelayNs,
{
    fn wait_ready(&mut self, timeout: Duration) -> Result<(), SensorError> {
        self.wait(timeout)
    }

    fn read_average(&mut self, times: u8) -> Result<i32, SensorError> {
        Hx711::read_average(self, times)
    }
}

fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

fn pin_error<E: embedded_hal::digital::Error>(e: E) -> SensorError {
    SensorError::Pin(format!("{:?}", e.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::ErrorType;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        ready: bool,
        sck_high: bool,
        bits: VecDeque<bool>,
        rising_edges: usize,
    }

    impl Wire {
        fn push_sample(&mut self, raw: u32) {
            for i in (0..24).rev() {
                self.bits.push_back(raw & (1 << i) != 0);
            }
        }
    }

    struct Dout(Rc<RefCell<Wire>>);
    struct Sck(Rc<RefCell<Wire>>);
    struct NoDelay;

    impl ErrorType for Dout {
        type Error = Infallible;
    }

    impl InputPin for Dout {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            let mut wire = self.0.borrow_mut();
            if wire.sck_high {
                Ok(wire.bits.pop_front().unwrap_or(false))
            } else {
                Ok(!wire.ready)
            }
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    impl ErrorType for Sck {
        type Error = Infallible;
    }

    impl OutputPin for Sck {
        fn set_high(&mut self) -> Result<(), Infallible> {
            let mut wire = self.0.borrow_mut();
            if !wire.sck_high {
                wire.rising_edges += 1;
            }
            wire.sck_high = true;
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().sck_high = false;
            Ok(())
        }
    }

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn device(gain: Gain) -> (Hx711<Dout, Sck, NoDelay>, Rc<RefCell<Wire>>) {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let hx = Hx711::new(Dout(wire.clone()), Sck(wire.clone()), NoDelay, gain);
        (hx, wire)
    }

    #[test]
    fn test_sign_extension() {
        assert_eq!(sign_extend_24(0x00_0001), 1);
        assert_eq!(sign_extend_24(0x7F_FFFF), 8_388_607);
        assert_eq!(sign_extend_24(0xFF_FFFF), -1);
        assert_eq!(sign_extend_24(0x80_0000), -8_388_608);
    }

    #[test]
    fn test_read_positive_and_negative() {
        let (mut hx, wire) = device(Gain::A128);
        wire.borrow_mut().ready = true;
        wire.borrow_mut().push_sample(0x01_2345);
        wire.borrow_mut().push_sample(0xFF_FFF6);

        assert_eq!(hx.read_data().unwrap(), 0x01_2345);
        assert_eq!(hx.read_data().unwrap(), -10);
    }

    #[test]
    fn test_gain_pulses() {
        for (gain, pulses) in [(Gain::A128, 25), (Gain::B32, 26), (Gain::A64, 27)] {
            let (mut hx, wire) = device(gain);
            wire.borrow_mut().ready = true;
            wire.borrow_mut().push_sample(0);

            hx.read_data().unwrap();

            assert_eq!(wire.borrow().rising_edges, pulses);
        }
    }

    #[test]
    fn test_average() {
        let (mut hx, wire) = device(Gain::A64);
        {
            let mut wire = wire.borrow_mut();
            wire.ready = true;
            wire.push_sample(100);
            wire.push_sample(200);
            wire.push_sample(300);
        }

        assert_eq!(LoadCell::read_average(&mut hx, 3).unwrap(), 200);
    }

    #[test]
    fn test_wait_times_out() {
        let (mut hx, _wire) = device(Gain::A64);
        let err = hx.wait(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, SensorError::NotReady(Duration::from_millis(20)));
    }

    /// Delay that rounds every request up to a 10 ms scheduler tick.
    struct TickDelay;

    impl DelayNs for TickDelay {
        fn delay_ns(&mut self, ns: u32) {
            let tick_ns = 10_000_000u64;
            let ticks = (u64::from(ns) + tick_ns - 1) / tick_ns;
            std::thread::sleep(Duration::from_nanos(ticks.max(1) * tick_ns));
        }
    }

    #[test]
    fn test_wait_deadline_holds_with_coarse_ticks() {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let mut hx = Hx711::new(Dout(wire.clone()), Sck(wire), TickDelay, Gain::A64);
        let timeout = Duration::from_millis(200);

        let started = Instant::now();
        let err = hx.wait(timeout).unwrap_err();
        let took = started.elapsed();

        assert_eq!(err, SensorError::NotReady(timeout));
        assert!(took >= timeout, "gave up early after {:?}", took);
        assert!(took < Duration::from_millis(400), "overran to {:?}", took);
    }

    /// Records every delay request, in nanoseconds.
    #[derive(Clone, Default)]
    struct RecordingDelay(Rc<RefCell<Vec<u32>>>);

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.borrow_mut().push(ns);
        }

        fn delay_us(&mut self, us: u32) {
            self.delay_ns(us.saturating_mul(1_000));
        }

        fn delay_ms(&mut self, ms: u32) {
            self.delay_ns(ms.saturating_mul(1_000_000));
        }
    }

    #[test]
    fn test_clock_pulses_use_microsecond_delays() {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let delay = RecordingDelay::default();
        let mut hx = Hx711::new(Dout(wire.clone()), Sck(wire.clone()), delay.clone(), Gain::A64);
        wire.borrow_mut().ready = true;
        wire.borrow_mut().push_sample(7);

        assert_eq!(hx.read_data().unwrap(), 7);

        let delays = delay.0.borrow();
        // 27 pulses, each with a high and a low half.
        assert_eq!(delays.len(), 54);
        // Far below the 60 us that powers the converter down.
        assert!(delays.iter().all(|&ns| ns <= 1_000));
    }

    #[test]
    fn test_zero_sample_count_rejected() {
        let (mut hx, wire) = device(Gain::A64);
        wire.borrow_mut().ready = true;
        assert_eq!(
            hx.read_average(0).unwrap_err(),
            SensorError::InvalidSampleCount(0)
        );
    }

    #[test]
    fn test_init_programs_gain_with_one_read() {
        let (mut hx, wire) = device(Gain::B32);
        wire.borrow_mut().ready = true;
        wire.borrow_mut().push_sample(42);

        hx.init().unwrap();

        assert!(wire.borrow().bits.is_empty());
        assert_eq!(wire.borrow().rising_edges, 26);
    }
}
