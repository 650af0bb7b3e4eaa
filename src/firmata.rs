//! The handful of Firmata messages the board driver needs, encoded to bytes.
//!
//! Only output is supported: configuring a pin, writing a digital level and
//! writing a PWM duty. Values arrive as `0.0..=1.0` and are scaled to the
//! 8-bit PWM range the standard firmware expects.

/// How a channel is driven on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// On/off only.
    Digital,
    /// Proportional output.
    Pwm,
}

impl PinMode {
    /// Values of exactly 0 or 1 imply digital mode, anything else PWM.
    pub fn for_value(value: f64) -> Self {
        if value == 0.0 || value == 1.0 {
            PinMode::Digital
        } else {
            PinMode::Pwm
        }
    }

    fn code(self) -> u8 {
        match self {
            PinMode::Digital => MODE_OUTPUT,
            PinMode::Pwm => MODE_PWM,
        }
    }
}

const SET_PIN_MODE: u8 = 0xF4;
const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
const ANALOG_MESSAGE: u8 = 0xE0;
const START_SYSEX: u8 = 0xF0;
const END_SYSEX: u8 = 0xF7;
const EXTENDED_ANALOG: u8 = 0x6F;

const MODE_OUTPUT: u8 = 0x01;
const MODE_PWM: u8 = 0x03;

const PWM_MAX: f64 = 255.0;

/// `SET_PIN_MODE pin mode`
pub fn set_pin_mode(pin: u8, mode: PinMode) -> Vec<u8> {
    vec![SET_PIN_MODE, pin & 0x7F, mode.code()]
}

/// Encode a write of `value` to `pin` in the given mode.
pub fn write(pin: u8, value: f64, mode: PinMode) -> Vec<u8> {
    match mode {
        PinMode::Digital => {
            let level = u8::from(value > 0.0);
            vec![SET_DIGITAL_PIN_VALUE, pin & 0x7F, level]
        }
        PinMode::Pwm => {
            let duty = (value.clamp(0.0, 1.0) * PWM_MAX).round() as u16;
            let (lsb, msb) = ((duty & 0x7F) as u8, ((duty >> 7) & 0x7F) as u8);
            if pin < 16 {
                vec![ANALOG_MESSAGE | pin, lsb, msb]
            } else {
                vec![START_SYSEX, EXTENDED_ANALOG, pin & 0x7F, lsb, msb, END_SYSEX]
            }
        }
    }
}
