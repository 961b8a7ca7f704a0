use std::fmt::Debug;

use embedded_hal::digital::{Error, ErrorKind, ErrorType, InputPin, OutputPin, PinState};
use rppal::gpio::{IoPin, Mode};

#[derive(Debug, Clone, Copy)]
pub enum OpenDrainPinWapperError {
    Ok = 0,
}

impl Error for OpenDrainPinWapperError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Ok => ErrorKind::Other,
        }
    }
}

impl std::fmt::Display for OpenDrainPinWapperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl std::error::Error for OpenDrainPinWapperError {}

/// Open-Drain Pin Wapper
///
/// 把rppal的IoPin包装成开漏语义的embedded-hal引脚:
/// - set_high不会推挽驱动高电平，而是把引脚切回输入模式"释放"总线，
///   由外部上拉电阻拉高(双线总线要求，否则会与拉低总线的从机短路)
/// - set_low把引脚切到输出模式并驱动低电平
/// - is_high/is_low在输入模式下采样总线的实际电平
pub struct OpenDrainPinWapper {
    pin: IoPin,
    mode: Mode,
}

impl ErrorType for OpenDrainPinWapper {
    type Error = OpenDrainPinWapperError;
}

impl OpenDrainPinWapper {
    pub fn new(pin: IoPin) -> Self {
        Self {
            pin,
            mode: Mode::Null,
        }
    }
}

impl InputPin for OpenDrainPinWapper {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        if self.mode != Mode::Input {
            self.pin.set_mode(Mode::Input);
            self.mode = Mode::Input;
        }

        Ok(self.pin.is_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        if self.mode != Mode::Input {
            self.pin.set_mode(Mode::Input);
            self.mode = Mode::Input;
        }

        Ok(self.pin.is_low())
    }
}

impl OutputPin for OpenDrainPinWapper {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        // 释放总线，交给外部上拉电阻
        if self.mode != Mode::Input {
            self.pin.set_mode(Mode::Input);
            self.mode = Mode::Input;
        }
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.mode != Mode::Output {
            self.pin.set_mode(Mode::Output);
            self.mode = Mode::Output;
        }

        self.pin.set_low();
        Ok(())
    }

    fn set_state(&mut self, state: PinState) -> Result<(), Self::Error> {
        match state {
            PinState::High => self.set_high(),
            PinState::Low => self.set_low(),
        }
    }
}
