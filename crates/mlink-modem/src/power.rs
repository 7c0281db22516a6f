//! Power and status pin control.
//!
//! Some carrier boards leave the modem permanently powered; both pins are
//! optional and an unwired controller succeeds as a no-op. The hold and
//! settle delays around these edges belong to the bring-up sequence, which
//! varies them per retry pass — not here.

use tracing::info;

/// A GPIO line the board wiring exposes for the modem.
///
/// Implementations are interior-mutable; the driver serializes power
/// sequencing per device above this trait.
pub trait PowerPin: Send {
    fn set_high(&self);
    fn set_low(&self);
    /// Current level, for status pins. Power pins may leave the default.
    fn is_high(&self) -> bool {
        false
    }
}

/// Drives the modem's power key and reads its power-status line.
pub struct PowerController {
    name: String,
    power_pin: Option<Box<dyn PowerPin>>,
    status_pin: Option<Box<dyn PowerPin>>,
}

impl PowerController {
    pub fn new(
        name: &str,
        power_pin: Option<Box<dyn PowerPin>>,
        status_pin: Option<Box<dyn PowerPin>>,
    ) -> Self {
        PowerController {
            name: name.to_string(),
            power_pin,
            status_pin,
        }
    }

    pub fn is_wired(&self) -> bool {
        self.power_pin.is_some()
    }

    /// Drive the modem on. The ML307R power key is active-low.
    pub fn power_on(&self) {
        if let Some(pin) = &self.power_pin {
            info!(device = %self.name, "power on");
            pin.set_low();
        }
    }

    pub fn power_off(&self) {
        if let Some(pin) = &self.power_pin {
            info!(device = %self.name, "power off");
            pin.set_high();
        }
    }

    /// Power-status line level, when wired.
    pub fn status_high(&self) -> Option<bool> {
        self.status_pin.as_ref().map(|pin| pin.is_high())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakePin {
        high: Arc<AtomicBool>,
    }

    impl PowerPin for FakePin {
        fn set_high(&self) {
            self.high.store(true, Ordering::SeqCst);
        }
        fn set_low(&self) {
            self.high.store(false, Ordering::SeqCst);
        }
        fn is_high(&self) -> bool {
            self.high.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn unwired_controller_is_a_noop() {
        let ctrl = PowerController::new("m0", None, None);
        assert!(!ctrl.is_wired());
        ctrl.power_on();
        ctrl.power_off();
        assert_eq!(ctrl.status_high(), None);
    }

    #[test]
    fn power_key_is_active_low() {
        let level = Arc::new(AtomicBool::new(true));
        let ctrl = PowerController::new(
            "m0",
            Some(Box::new(FakePin {
                high: level.clone(),
            })),
            None,
        );
        ctrl.power_on();
        assert!(!level.load(Ordering::SeqCst), "on drives the key low");
        ctrl.power_off();
        assert!(level.load(Ordering::SeqCst), "off drives the key high");
    }

    #[test]
    fn status_pin_reads_through() {
        let level = Arc::new(AtomicBool::new(true));
        let ctrl = PowerController::new(
            "m0",
            None,
            Some(Box::new(FakePin {
                high: level.clone(),
            })),
        );
        assert_eq!(ctrl.status_high(), Some(true));
        level.store(false, Ordering::SeqCst);
        assert_eq!(ctrl.status_high(), Some(false));
    }
}
