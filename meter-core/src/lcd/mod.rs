//! HD44780 character LCD behind an MCP23017 I²C port expander.
//!
//! Port A of the expander carries the 8-bit LCD data bus. Port B carries the
//! control lines and the backlight switch:
//!
//! | bit | signal    |
//! |-----|-----------|
//! | 1   | R/W (held low) |
//! | 2   | RS        |
//! | 3   | backlight |
//! | 4   | E         |

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::display::CharacterDisplay;

/// Default 7-bit address of the expander (A2..A0 strapped low).
pub const MCP23017_ADDRESS: u8 = 0x20;

const IODIRA: u8 = 0x00;
const IODIRB: u8 = 0x01;
const GPIOA: u8 = 0x12;
const GPIOB: u8 = 0x13;

const READ_NOT_WRITE: u8 = 1 << 1;
const REGISTER_SELECT: u8 = 1 << 2;
const BACKLIGHT: u8 = 1 << 3;
const ENABLE: u8 = 1 << 4;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x04;
const CMD_DISPLAY_CONTROL: u8 = 0x08;
const CMD_SHIFT: u8 = 0x10;
const CMD_FUNCTION_SET: u8 = 0x20;
const CMD_SET_DDRAM: u8 = 0x80;

const ENTRY_INCREMENT: u8 = 0x02;
const DISPLAY_ON: u8 = 0x04;
const FUNCTION_8_BIT: u8 = 0x10;
const FUNCTION_2_LINE: u8 = 0x08;
const LINE_1_OFFSET: u8 = 0x40;

const POWER_ON_DELAY_MS: u32 = 15;
const SLOW_COMMAND_DELAY_US: u32 = 2_000;
const COMMAND_DELAY_US: u32 = 40;
const POSITION_DELAY_US: u32 = 100;

/// Errors reported while bringing the display up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LcdError<E> {
    /// The expander did not acknowledge the first configuration write.
    ExpanderNotFound(E),
    /// A later bus transfer failed.
    Bus(E),
}

impl<E: fmt::Debug> fmt::Display for LcdError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LcdError::ExpanderNotFound(err) => write!(f, "lcd expander not found: {err:?}"),
            LcdError::Bus(err) => write!(f, "lcd bus error: {err:?}"),
        }
    }
}

/// LCD driver. Construct it, call [`Mcp23017Lcd::init`], then drive it through
/// [`CharacterDisplay`].
pub struct Mcp23017Lcd<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    backlight: bool,
    bus_errors: u32,
}

impl<I2C, D> Mcp23017Lcd<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Creates a driver for the expander at [`MCP23017_ADDRESS`].
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, MCP23017_ADDRESS)
    }

    /// Creates a driver for an expander strapped to another address.
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            backlight: false,
            bus_errors: 0,
        }
    }

    /// Configures the expander and runs the HD44780 initialisation sequence.
    ///
    /// # Errors
    ///
    /// Returns [`LcdError::ExpanderNotFound`] when the expander does not answer
    /// and [`LcdError::Bus`] when a later transfer fails.
    pub fn init(&mut self) -> Result<(), LcdError<I2C::Error>> {
        self.write_register(IODIRA, 0x00)
            .map_err(LcdError::ExpanderNotFound)?;
        self.write_register(IODIRB, 0x00).map_err(LcdError::Bus)?;
        self.write_register(GPIOB, self.control_bits(false))
            .map_err(LcdError::Bus)?;
        self.delay.delay_ms(POWER_ON_DELAY_MS);

        self.command(CMD_FUNCTION_SET | FUNCTION_8_BIT | FUNCTION_2_LINE)
            .map_err(LcdError::Bus)?;
        self.command(CMD_SHIFT).map_err(LcdError::Bus)?;
        self.command(CMD_DISPLAY_CONTROL | DISPLAY_ON)
            .map_err(LcdError::Bus)?;
        self.command(CMD_ENTRY_MODE | ENTRY_INCREMENT)
            .map_err(LcdError::Bus)?;
        self.command(CMD_CLEAR).map_err(LcdError::Bus)?;
        self.delay.delay_us(SLOW_COMMAND_DELAY_US);
        Ok(())
    }

    /// Number of bus transfers that failed after initialisation.
    #[must_use]
    pub const fn bus_errors(&self) -> u32 {
        self.bus_errors
    }

    /// Releases the bus and delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn set_position(&mut self, line: u8, column: u8) -> Result<(), I2C::Error> {
        let row = if line == 0 { 0 } else { LINE_1_OFFSET };
        self.command(CMD_SET_DDRAM | row | (column & 0x3F))?;
        self.delay.delay_us(POSITION_DELAY_US);
        Ok(())
    }

    fn write_bytes(&mut self, text: &str) -> Result<(), I2C::Error> {
        for byte in text.bytes() {
            self.transfer(byte, true)?;
        }
        Ok(())
    }

    fn command(&mut self, command: u8) -> Result<(), I2C::Error> {
        self.transfer(command, false)
    }

    /// Latches one byte: data on port A, then a high-low pulse on E.
    fn transfer(&mut self, byte: u8, data: bool) -> Result<(), I2C::Error> {
        let control = self.control_bits(data);
        self.write_register(GPIOA, byte)?;
        self.write_register(GPIOB, control | ENABLE)?;
        self.delay.delay_us(1);
        self.write_register(GPIOB, control)?;
        self.delay.delay_us(COMMAND_DELAY_US);
        Ok(())
    }

    fn control_bits(&self, data: bool) -> u8 {
        let mut bits = 0;
        if data {
            bits |= REGISTER_SELECT;
        }
        if self.backlight {
            bits |= BACKLIGHT;
        }
        bits & !READ_NOT_WRITE
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[register, value])
    }

    fn absorb(&mut self, result: Result<(), I2C::Error>) {
        if result.is_err() {
            self.bus_errors = self.bus_errors.saturating_add(1);
        }
    }
}

impl<I2C, D> CharacterDisplay for Mcp23017Lcd<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn clear(&mut self) {
        let result = self.command(CMD_CLEAR);
        self.absorb(result);
        self.delay.delay_us(SLOW_COMMAND_DELAY_US);
    }

    fn write(&mut self, text: &str) {
        let result = self.write_bytes(text);
        self.absorb(result);
    }

    fn write_at(&mut self, text: &str, line: u8, column: u8) {
        let result = self
            .set_position(line, column)
            .and_then(|()| self.write_bytes(text));
        self.absorb(result);
    }

    fn set_backlight(&mut self, enabled: bool) {
        self.backlight = enabled;
        let result = self.write_register(GPIOB, self.control_bits(false));
        self.absorb(result);
    }

    fn backlight(&self) -> bool {
        self.backlight
    }
}
