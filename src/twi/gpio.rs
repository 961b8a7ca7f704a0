use std::time::Duration;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_timers::clock::Clock;

use super::{TwiBus, condition};

/// 事务阶段，用于合成正确的条件码
///
/// 位敲击端口自己并不知道某个字节是地址还是数据，
/// 必须像硬件总线引擎一样跟踪帧内阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    AddressedWrite,
    AddressedRead,
}

/// GPIO位敲击双线总线主机端口
///
/// 在两个开漏引脚(SDA、SCL)上逐位敲出双线总线波形:
/// - 释放引脚(set_high)后依靠外部上拉电阻回到高电平，绝不推挽驱动高电平
/// - 每个时钟高电平阶段都会等待SCL真正变高，从机拉住SCL延展时钟时
///   主机会无限期等待，总线卡死就挂起调用方，没有超时
/// - 引脚故障一律上报为总线错误状态码，由主机协议中止事务
///
/// 时序等待使用时钟源自旋实现，std::thread::sleep的调度粒度
/// 对微秒级的位时序来说太粗了
pub struct GpioTwi<'a, C, SDA, SCL>
where
    C: Clock,
    C::Instant: Copy,
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
{
    clock: &'a C,
    sda: SDA,
    scl: SCL,
    /// 半个时钟周期
    half_period: Duration,
    phase: Phase,
}

impl<'a, C, SDA, SCL> GpioTwi<'a, C, SDA, SCL>
where
    C: Clock,
    C::Instant: Copy,
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
{
    /// 构建位敲击端口
    ///
    /// - `bus_hz`: 总线时钟频率，BME280支持到400kHz，常用100kHz
    /// - 两个引脚都必须是开漏语义(释放即高)，且总线上有外部上拉电阻
    pub fn new(clock: &'a C, sda: SDA, scl: SCL, bus_hz: u32) -> Self {
        Self {
            clock,
            sda,
            scl,
            half_period: Duration::from_nanos(u64::from(500_000_000 / bus_hz)),
            phase: Phase::Idle,
        }
    }

    /// 自旋等待半个时钟周期
    fn wait_half(&self) {
        let mark = self.clock.now();
        while self.clock.elapsed(mark) < self.half_period {}
    }

    /// 释放SCL并等待它真正回到高电平(从机可能延展时钟)
    fn wait_scl_high(&mut self) -> Result<(), ()> {
        self.scl.set_high().map_err(|_| ())?;
        loop {
            if self.scl.is_high().map_err(|_| ())? {
                return Ok(());
            }
        }
    }

    /// 敲出一个数据位(SCL处于低电平时进入)
    fn write_bit(&mut self, bit: bool) -> Result<(), ()> {
        if bit {
            self.sda.set_high().map_err(|_| ())?;
        } else {
            self.sda.set_low().map_err(|_| ())?;
        }
        // 数据建立时间
        self.wait_half();
        self.wait_scl_high()?;
        // 时钟高电平保持
        self.wait_half();
        self.scl.set_low().map_err(|_| ())
    }

    /// 读入一个数据位(SCL处于低电平、SDA已释放时进入)
    fn read_bit(&mut self) -> Result<bool, ()> {
        self.wait_half();
        self.wait_scl_high()?;
        let bit = self.sda.is_high().map_err(|_| ())?;
        self.wait_half();
        self.scl.set_low().map_err(|_| ())?;
        Ok(bit)
    }

    /// 发出START条件: SCL高电平期间SDA由高变低
    fn try_start(&mut self) -> Result<(), ()> {
        if self.phase == Phase::Idle {
            // 新事务: 两条线都应处于空闲高电平，否则总线被占用或卡死
            self.sda.set_high().map_err(|_| ())?;
            self.wait_scl_high()?;
            self.wait_half();
            if !self.sda.is_high().map_err(|_| ())? {
                return Err(());
            }
        } else {
            // 重复START: 上一个字节结束后SCL停在低电平
            self.sda.set_high().map_err(|_| ())?;
            self.wait_half();
            self.wait_scl_high()?;
            self.wait_half();
        }
        self.sda.set_low().map_err(|_| ())?;
        self.wait_half();
        self.scl.set_low().map_err(|_| ())?;
        Ok(())
    }

    /// 敲出一个字节并采样从机的应答位，true表示ACK
    fn try_write_byte(&mut self, byte: u8) -> Result<bool, ()> {
        for i in (0..8).rev() {
            self.write_bit((byte >> i) & 0b1 != 0)?;
        }
        // 第9个时钟: 释放SDA，由从机给出应答位，低电平为ACK
        self.sda.set_high().map_err(|_| ())?;
        self.wait_half();
        self.wait_scl_high()?;
        let ack = !self.sda.is_high().map_err(|_| ())?;
        self.wait_half();
        self.scl.set_low().map_err(|_| ())?;
        Ok(ack)
    }

    /// 读入一个字节并发出主机应答位
    fn try_read_byte(&mut self, ack: bool) -> Result<u8, ()> {
        // 数据方向交给从机
        self.sda.set_high().map_err(|_| ())?;
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | u8::from(self.read_bit()?);
        }
        // 第9个时钟: 主机给出应答位，ACK拉低，NACK保持释放
        if ack {
            self.sda.set_low().map_err(|_| ())?;
        } else {
            self.sda.set_high().map_err(|_| ())?;
        }
        self.wait_half();
        self.wait_scl_high()?;
        self.wait_half();
        self.scl.set_low().map_err(|_| ())?;
        // 交还SDA
        self.sda.set_high().map_err(|_| ())?;
        Ok(byte)
    }

    /// 发出STOP条件: SCL高电平期间SDA由低变高
    fn try_stop(&mut self) -> Result<(), ()> {
        self.sda.set_low().map_err(|_| ())?;
        self.wait_half();
        self.wait_scl_high()?;
        self.wait_half();
        self.sda.set_high().map_err(|_| ())?;
        self.wait_half();
        Ok(())
    }
}

impl<'a, C, SDA, SCL> TwiBus for GpioTwi<'a, C, SDA, SCL>
where
    C: Clock,
    C::Instant: Copy,
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
{
    fn start(&mut self) -> u8 {
        match self.try_start() {
            Ok(()) => {
                self.phase = Phase::Started;
                condition::START
            }
            Err(()) => {
                self.phase = Phase::Idle;
                condition::BUS_ERROR
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> u8 {
        let ack = match self.try_write_byte(byte) {
            Ok(ack) => ack,
            Err(()) => {
                self.phase = Phase::Idle;
                return condition::BUS_ERROR;
            }
        };
        // 根据帧内阶段与读写位合成硬件总线引擎会给出的条件码
        match self.phase {
            Phase::Started => {
                let read = (byte & 0b1) != 0;
                match (read, ack) {
                    (false, true) => {
                        self.phase = Phase::AddressedWrite;
                        condition::ADDR_WRITE_ACK
                    }
                    (true, true) => {
                        self.phase = Phase::AddressedRead;
                        condition::ADDR_READ_ACK
                    }
                    (false, false) => {
                        self.phase = Phase::Idle;
                        condition::ADDR_WRITE_NACK
                    }
                    (true, false) => {
                        self.phase = Phase::Idle;
                        condition::ADDR_READ_NACK
                    }
                }
            }
            Phase::AddressedWrite => {
                if ack {
                    condition::DATA_WRITE_ACK
                } else {
                    condition::DATA_WRITE_NACK
                }
            }
            // 协议误用: 没有START或处于读帧时发送字节
            Phase::Idle | Phase::AddressedRead => condition::BUS_ERROR,
        }
    }

    fn read_byte(&mut self, ack: bool) -> (u8, u8) {
        if self.phase != Phase::AddressedRead {
            return (0, condition::BUS_ERROR);
        }
        match self.try_read_byte(ack) {
            Ok(byte) => {
                let cond = if ack {
                    condition::DATA_READ_ACK
                } else {
                    condition::DATA_READ_NACK
                };
                (byte, cond)
            }
            Err(()) => {
                self.phase = Phase::Idle;
                (0, condition::BUS_ERROR)
            }
        }
    }

    fn stop(&mut self) {
        let _ = self.try_stop();
        self.phase = Phase::Idle;
    }
}
