//! Rotary knob decoding.
//!
//! A [`Knob`] turns the 2-bit quadrature signal of a rotary encoder into a
//! bounded integer, and the encoder's push switch into a toggled boolean.
//! Both decoders are pure functions of the input history.

/// Quadrature state as a 2-bit value: bit 0 = channel A, bit 1 = channel B.
pub type QuadratureState = u8;

/// Push-switch decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PressState {
    /// Waiting for a press.
    #[default]
    Idle,
    /// Switch is held; the toggle has already flipped for this press.
    Pressed,
    /// Switch came up once. Another released sample re-arms the decoder;
    /// a press seen here is contact bounce and does not toggle.
    Released,
}

/// Rotary encoder with clamped rotation value and a push toggle.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Knob {
    /// Current rotation value, always within `[lower, upper]`.
    value: i32,
    /// Minimum allowed value (inclusive).
    lower: i32,
    /// Maximum allowed value (inclusive).
    upper: i32,
    /// Quadrature state seen on the previous update.
    previous: QuadratureState,
    /// Delta applied by the last single step, re-used for double steps.
    last_delta: i32,
    /// Push-switch decoder state.
    press: PressState,
    /// Toggled on every accepted press.
    toggled: bool,
}

impl Default for Knob {
    fn default() -> Self {
        Self::new(-100, 100)
    }
}

impl Knob {
    /// Create a knob at value 0 (clamped into the limits).
    pub const fn new(lower: i32, upper: i32) -> Self {
        Self::with_value(lower, upper, 0)
    }

    /// Create a knob with an explicit starting value (clamped into the limits).
    pub const fn with_value(lower: i32, upper: i32, value: i32) -> Self {
        let value = if value < lower {
            lower
        } else if value > upper {
            upper
        } else {
            value
        };
        Self {
            value,
            lower,
            upper,
            previous: 0,
            last_delta: 0,
            press: PressState::Idle,
            toggled: false,
        }
    }

    /// Change the limits. The current value is clamped into the new range.
    pub fn set_limits(&mut self, lower: i32, upper: i32) {
        self.lower = lower;
        self.upper = upper;
        self.value = self.value.clamp(lower, upper);
    }

    /// Current rotation value.
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Current `(lower, upper)` limits.
    pub fn limits(&self) -> (i32, i32) {
        (self.lower, self.upper)
    }

    /// Feed one quadrature sample.
    ///
    /// | previous → current | effect |
    /// |---|---|
    /// | 00→01, 11→10 | +1 |
    /// | 10→11, 01→00 | −1 |
    /// | 00→11, 11→00 | repeat the last single-step delta |
    /// | anything else | no movement |
    ///
    /// The result is clamped to the limits.
    ///
    /// # Examples
    ///
    /// ```
    /// use octavo::Knob;
    ///
    /// let mut knob = Knob::new(0, 8);
    /// knob.update_rotation(0b00);
    /// knob.update_rotation(0b01);
    /// assert_eq!(knob.value(), 1);
    /// ```
    pub fn update_rotation(&mut self, current: QuadratureState) {
        let current = current & 0b11;
        let delta = match (self.previous, current) {
            (0b00, 0b01) | (0b11, 0b10) => {
                self.last_delta = 1;
                1
            }
            (0b10, 0b11) | (0b01, 0b00) => {
                self.last_delta = -1;
                -1
            }
            (0b00, 0b11) | (0b11, 0b00) => self.last_delta,
            _ => 0,
        };
        self.value = (self.value + delta).clamp(self.lower, self.upper);
        self.previous = current;
    }

    /// Feed one push-switch sample (`true` = switch held).
    ///
    /// The toggle flips on the edge into [`PressState::Pressed`]; the switch
    /// must then be seen released twice in a row before the next press
    /// counts.
    pub fn update_press(&mut self, pressed: bool) {
        self.press = match (self.press, pressed) {
            (PressState::Idle, true) => {
                self.toggled = !self.toggled;
                PressState::Pressed
            }
            (PressState::Idle, false) => PressState::Idle,
            (PressState::Pressed, true) => PressState::Pressed,
            (PressState::Pressed, false) => PressState::Released,
            (PressState::Released, true) => PressState::Pressed,
            (PressState::Released, false) => PressState::Idle,
        };
    }

    /// State of the push toggle.
    pub fn toggled(&self) -> bool {
        self.toggled
    }

    /// Push-switch decoder state.
    pub fn press_state(&self) -> PressState {
        self.press
    }
}
