use embedded_hal::digital::{OutputPin, PinState};
use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LedState {
    #[default]
    Off = 0,
    On = 1,
}

impl From<bool> for LedState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl From<LedState> for PinState {
    fn from(state: LedState) -> Self {
        match state {
            LedState::Off => PinState::Low,
            LedState::On => PinState::High,
        }
    }
}

/// Sink for the CANopen run and error status lights, chosen by the
/// application (GPIOs, an LED controller, ...).
pub trait IndicatorDriver {
    fn set_run_led(&mut self, state: LedState);

    fn set_error_led(&mut self, state: LedState);

    fn reset_leds(&mut self) {
        self.set_run_led(LedState::Off);
        self.set_error_led(LedState::Off);
    }
}

/// Light states derived by the protocol stack's NMT state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicatorStatus {
    pub run: bool,
    pub error: bool,
}

/// Pushes the current light states to the driver.
pub fn process_indicators<D: IndicatorDriver + ?Sized>(driver: &mut D, status: IndicatorStatus) {
    driver.set_run_led(status.run.into());
    driver.set_error_led(status.error.into());
}

/// Drives the lights through two output pins. A missing pin is not
/// connected and silently ignored.
pub struct DigitalOutIndicators<R, E> {
    run: Option<R>,
    error: Option<E>,
}

impl<R: OutputPin, E: OutputPin> DigitalOutIndicators<R, E> {
    /// Takes the pins and switches both lights off.
    pub fn new(run: Option<R>, error: Option<E>) -> Self {
        let mut indicators = Self { run, error };
        indicators.reset_leds();
        indicators
    }

    pub fn release(self) -> (Option<R>, Option<E>) {
        (self.run, self.error)
    }
}

impl<R: OutputPin, E: OutputPin> IndicatorDriver for DigitalOutIndicators<R, E> {
    fn set_run_led(&mut self, state: LedState) {
        if let Some(pin) = self.run.as_mut() {
            // A status light has nowhere to report a failure to
            let _ = pin.set_state(state.into());
        }
    }

    fn set_error_led(&mut self, state: LedState) {
        if let Some(pin) = self.error.as_mut() {
            let _ = pin.set_state(state.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embedded_hal::digital::{ErrorType, OutputPin};

    use super::{process_indicators, DigitalOutIndicators, IndicatorDriver, IndicatorStatus};

    #[derive(Debug, Default)]
    struct Pin {
        high: bool,
        writes: usize,
    }

    impl ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn new_switches_lights_off() {
        let indicators = DigitalOutIndicators::new(
            Some(Pin {
                high: true,
                writes: 0,
            }),
            Some(Pin::default()),
        );

        let (run, error) = indicators.release();
        let (run, error) = (run.unwrap(), error.unwrap());

        assert!(!run.high);
        assert!(!error.high);
        assert_eq!(run.writes, 1);
    }

    #[test]
    fn process_follows_status() {
        let mut indicators = DigitalOutIndicators::new(Some(Pin::default()), Some(Pin::default()));

        process_indicators(
            &mut indicators,
            IndicatorStatus {
                run: true,
                error: false,
            },
        );

        let (run, error) = indicators.release();
        assert!(run.unwrap().high);
        assert!(!error.unwrap().high);
    }

    #[test]
    fn missing_pin_is_ignored() {
        let mut indicators = DigitalOutIndicators::<Pin, Pin>::new(None, Some(Pin::default()));

        process_indicators(
            &mut indicators,
            IndicatorStatus {
                run: true,
                error: true,
            },
        );
        assert!(indicators.release().1.unwrap().high);

        let mut indicators = DigitalOutIndicators::<Pin, Pin>::new(None, None);
        indicators.reset_leds();
    }
}
