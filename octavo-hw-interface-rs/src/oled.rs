//! OLED panel: a 128×32 SSD1305/SSD1306 on I2C in async buffered mode.
//!
//! [`OledDriver`] owns the controller. It is built without bus traffic,
//! initialised once, and then implements [`DisplaySink`] so the display
//! task can hand it a [`DisplayState`] every refresh.

use defmt::*;
use display_interface::DisplayError;
use display_interface_i2c::I2CInterface;
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use embedded_hal_async::i2c::I2c;
use ssd1306::{mode::BufferedGraphicsModeAsync, prelude::*, I2CDisplayInterface, Ssd1306Async};

use octavo::{DisplaySink, DisplayState};

/// Default 7-bit address of the panel.
pub const OLED_ADDRESS: u8 = 0x3C;

/// Pixel rows between text baselines.
const LINE_PITCH: i32 = 10;

type Display<I2C> = Ssd1306Async<
    I2CInterface<I2C>,
    DisplaySize128x32,
    BufferedGraphicsModeAsync<DisplaySize128x32>,
>;

/// Errors from the panel.
#[derive(Debug)]
pub enum OledError {
    /// Bus-level failure reported by the display interface.
    Display(DisplayError),
    /// The controller did not accept the init sequence.
    InitializationFailed,
    /// Drawing was attempted before [`OledDriver::init`].
    NotInitialized,
}

impl From<DisplayError> for OledError {
    fn from(e: DisplayError) -> Self {
        OledError::Display(e)
    }
}

impl defmt::Format for OledError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            OledError::Display(_) => defmt::write!(f, "Display interface error"),
            OledError::InitializationFailed => defmt::write!(f, "Initialization failed"),
            OledError::NotInitialized => defmt::write!(f, "Not initialized"),
        }
    }
}

pub struct OledDriver<I2C> {
    display: Display<I2C>,
    initialized: bool,
}

impl<I2C: I2c> OledDriver<I2C> {
    /// No I2C traffic until [`init`](Self::init).
    pub fn new(i2c: I2C, address: u8) -> Self {
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let display = Ssd1306Async::new(interface, DisplaySize128x32, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        Self {
            display,
            initialized: false,
        }
    }

    /// Send the controller init sequence and blank the panel.
    ///
    /// The controller must already be out of reset and powered.
    pub async fn init(&mut self) -> Result<(), OledError> {
        self.display
            .init()
            .await
            .map_err(|_| OledError::InitializationFailed)?;
        self.initialized = true;
        self.display.clear_buffer();
        self.display.flush().await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Redraw the whole frame buffer from `state` and push it to the panel.
    pub async fn draw(&mut self, state: &DisplayState) -> Result<(), OledError> {
        if !self.initialized {
            return Err(OledError::NotInitialized);
        }
        self.display.clear_buffer();
        // Drawing into the buffer cannot fail.
        let _ = render_lines(&mut self.display, state);
        self.display.flush().await?;
        Ok(())
    }
}

impl<I2C: I2c> DisplaySink for OledDriver<I2C> {
    async fn show(&mut self, state: &DisplayState) {
        if let Err(e) = self.draw(state).await {
            warn!("Display refresh failed: {}", e);
        }
    }
}

/// Draw the state's text lines top to bottom, one per [`LINE_PITCH`].
pub fn render_lines<D>(target: &mut D, state: &DisplayState) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    for (i, line) in state.lines().iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        Text::with_baseline(
            line.as_str(),
            Point::new(2, i as i32 * LINE_PITCH),
            style,
            Baseline::Top,
        )
        .draw(target)?;
    }
    Ok(())
}
