//! BME280环境传感器驱动
//!
//! 基于双线总线主机事务协议(`crate::twi`)实现: 上电识别芯片、软复位、
//! 一次性加载出厂校准常数，之后以强制模式逐次触发测量，
//! 读出原始ADC计数并用定点补偿公式换算成物理单位。
//!
//! 整个驱动是同步阻塞的: 总线原语忙等硬件状态，测量完成靠
//! 最坏情况的固定延时表等待，从不轮询器件的就绪标志。

pub mod compensate;
pub mod registers;

use embedded_hal::delay::DelayNs;

use crate::twi::{TwiBus, TwiError, TwiMaster};
use compensate::{compensate_humidity, compensate_temperature};
use registers::{Mode, Oversampling};

/// 软复位后的上电稳定时间
const STARTUP_DELAY_MS: u32 = 2;
/// 单通道测量的最坏完成时间
const MEAS_DELAY_SINGLE_MS: u32 = 50;
/// 双通道测量的最坏完成时间
const MEAS_DELAY_DUAL_MS: u32 = 100;
/// 三通道测量的最坏完成时间
const MEAS_DELAY_TRIPLE_MS: u32 = 150;

/// BME280驱动错误
///
/// 每个会失败的步骤各对应一个变体，互不重叠；总线层失败时
/// 变体里携带底层的事务错误。任何一层都在第一个失败处停下并
/// 把对应的错误向上报告，不做重试，也不会留下写了一半的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bme280Error {
    /// 选择芯片ID寄存器失败
    IdRegister(TwiError),
    /// 读取芯片ID字节失败
    IdRead(TwiError),
    /// 芯片ID与固定值不符，总线上挂的不是BME280
    IdMismatch { found: u8 },
    /// 软复位写入被拒绝
    Reset(TwiError),
    /// 基线配置写入被拒绝
    Config(TwiError),
    /// 选择校准常数第一块失败
    CalibBlock1Select(TwiError),
    /// 读取校准常数第一块失败
    CalibBlock1Read(TwiError),
    /// 选择校准常数第二块失败
    CalibBlock2Select(TwiError),
    /// 读取校准常数第二块失败
    CalibBlock2Read(TwiError),
    /// 过采样/触发寄存器写入被拒绝
    MeasurementStart(TwiError),
    /// 选择温度输出寄存器失败
    TemperatureSelect(TwiError),
    /// 读取温度输出失败
    TemperatureRead(TwiError),
    /// 选择湿度输出寄存器失败
    HumiditySelect(TwiError),
    /// 读取湿度输出失败
    HumidityRead(TwiError),
}

impl std::fmt::Display for Bme280Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdRegister(err) => write!(f, "选择芯片ID寄存器失败: {}", err),
            Self::IdRead(err) => write!(f, "读取芯片ID失败: {}", err),
            Self::IdMismatch { found } => {
                write!(f, "芯片ID不符(读到{:#04x}，期望{:#04x})", found, registers::CHIP_ID)
            }
            Self::Reset(err) => write!(f, "软复位写入失败: {}", err),
            Self::Config(err) => write!(f, "基线配置写入失败: {}", err),
            Self::CalibBlock1Select(err) => write!(f, "选择校准常数第一块失败: {}", err),
            Self::CalibBlock1Read(err) => write!(f, "读取校准常数第一块失败: {}", err),
            Self::CalibBlock2Select(err) => write!(f, "选择校准常数第二块失败: {}", err),
            Self::CalibBlock2Read(err) => write!(f, "读取校准常数第二块失败: {}", err),
            Self::MeasurementStart(err) => write!(f, "写入测量控制寄存器失败: {}", err),
            Self::TemperatureSelect(err) => write!(f, "选择温度输出寄存器失败: {}", err),
            Self::TemperatureRead(err) => write!(f, "读取温度输出失败: {}", err),
            Self::HumiditySelect(err) => write!(f, "选择湿度输出寄存器失败: {}", err),
            Self::HumidityRead(err) => write!(f, "读取湿度输出失败: {}", err),
        }
    }
}

impl std::error::Error for Bme280Error {}

/// BME280出厂校准常数
///
/// 器件生产时写入NVM的定点补偿系数，上电后从两个连续寄存器块
/// 一次性读出(0x88起26字节、0xE1起8字节)，之后只读不改。
/// 任何一块读取失败都不会产生部分填充的实例。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    // 温度校准三元组
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,

    // 压力校准九元组(压力补偿未实现，常数仍按块整体加载)
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,

    // 湿度校准六元组
    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    /// 0xE4[7:0]<<4 | 0xE5[3:0]，与H5共享0xE5字节
    pub dig_h4: i16,
    /// 0xE6[7:0]<<4 | 0xE5[7:4]
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl Calibration {
    /// 从两个校准寄存器块解码全部常数
    ///
    /// 多字节字段一律小端序。第一块的最后一个字节(0xA1)是dig_H1，
    /// 0xA0是保留字节不参与解码；第二块里H4/H5以4位为界交错打包，
    /// 高位字节带符号扩展
    pub fn decode(
        block1: &[u8; registers::CALIB_BLOCK_1_LEN],
        block2: &[u8; registers::CALIB_BLOCK_2_LEN],
    ) -> Self {
        Self {
            dig_t1: u16::from_le_bytes([block1[0], block1[1]]),
            dig_t2: i16::from_le_bytes([block1[2], block1[3]]),
            dig_t3: i16::from_le_bytes([block1[4], block1[5]]),

            dig_p1: u16::from_le_bytes([block1[6], block1[7]]),
            dig_p2: i16::from_le_bytes([block1[8], block1[9]]),
            dig_p3: i16::from_le_bytes([block1[10], block1[11]]),
            dig_p4: i16::from_le_bytes([block1[12], block1[13]]),
            dig_p5: i16::from_le_bytes([block1[14], block1[15]]),
            dig_p6: i16::from_le_bytes([block1[16], block1[17]]),
            dig_p7: i16::from_le_bytes([block1[18], block1[19]]),
            dig_p8: i16::from_le_bytes([block1[20], block1[21]]),
            dig_p9: i16::from_le_bytes([block1[22], block1[23]]),

            dig_h1: block1[25],
            dig_h2: i16::from_le_bytes([block2[0], block2[1]]),
            dig_h3: block2[2],
            dig_h4: (i16::from(block2[3] as i8) << 4) | i16::from(block2[4] & 0x0F),
            dig_h5: (i16::from(block2[5] as i8) << 4) | i16::from(block2[4] >> 4),
            dig_h6: block2[6] as i8,
        }
    }
}

/// 一轮测量的补偿结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// 温度，摄氏百分度(2508即25.08℃)
    pub temperature: i32,
    /// 相对湿度，Q22.10定点(值/1024 = %RH)
    pub humidity: u32,
}

impl Measurement {
    /// 温度换算为摄氏度浮点值(仅供展示层使用)
    pub fn temperature_celsius(&self) -> f32 {
        self.temperature as f32 / 100.0
    }

    /// 湿度换算为%RH浮点值(仅供展示层使用)
    pub fn humidity_percent(&self) -> f32 {
        self.humidity as f32 / 1024.0
    }
}

/// 由激活通道数查最坏测量完成时间
///
/// 器件按顺序转换各通道而不是并行，等待时间随激活通道数阶梯增长。
/// 没有激活任何通道时不等待
fn measurement_delay_ms(
    ovs_t: Oversampling,
    ovs_p: Oversampling,
    ovs_h: Oversampling,
) -> u32 {
    let active = [ovs_t, ovs_p, ovs_h]
        .iter()
        .filter(|ovs| !ovs.is_skip())
        .count();
    match active {
        0 => 0,
        1 => MEAS_DELAY_SINGLE_MS,
        2 => MEAS_DELAY_DUAL_MS,
        _ => MEAS_DELAY_TRIPLE_MS,
    }
}

/// 把3字节温度寄存器组拼回20位原始值
///
/// 20位采样左对齐存放在3个字节里，最后一个字节只有高4位有效
fn raw_temperature_from_burst(burst: &[u8; registers::TEMP_LEN]) -> u32 {
    (u32::from(burst[0]) << 12) | (u32::from(burst[1]) << 4) | (u32::from(burst[2]) >> 4)
}

/// 把2字节湿度寄存器组拼回16位原始值
fn raw_humidity_from_burst(burst: &[u8; registers::HUM_LEN]) -> u16 {
    (u16::from(burst[0]) << 8) | u16::from(burst[1])
}

/// BME280传感器封装对象
///
/// 构造时完成完整的上电流程: 识别芯片、软复位、关闭滤波器、
/// 加载校准常数。之后每次读取都触发一轮强制测量并等最坏完成时间。
/// 总线为独占资源，同一时刻只有一个事务在途
pub struct BME280<B: TwiBus, D: DelayNs> {
    /// 双线总线主机
    master: TwiMaster<B>,
    /// 阻塞毫秒延时能力
    delay: D,
    /// 器件的7位总线地址
    address: u8,
    /// 初始化时读到的芯片ID
    chip_id: u8,
    /// 校准常数，加载后只读
    calib: Calibration,
}

impl<B: TwiBus, D: DelayNs> BME280<B, D> {
    /// 构建传感器实例
    ///
    /// `address`不给时使用SDO接地的默认地址0x76。
    /// 流程中的每一步都单独校验，任何一步失败都立刻带着
    /// 对应的错误中止，不会执行后续写入
    pub fn new(bus: B, mut delay: D, address: Option<u8>) -> Result<Self, Bme280Error> {
        let address = address.unwrap_or(registers::ADDRESS_GND);
        let mut master = TwiMaster::new(bus);

        // 识别芯片: ID不符时在任何写入发生之前中止
        master
            .select_register(address, registers::CHIP_ID_REG)
            .map_err(Bme280Error::IdRegister)?;
        let chip_id = master
            .receive_byte(address)
            .map_err(Bme280Error::IdRead)?;
        if chip_id != registers::CHIP_ID {
            return Err(Bme280Error::IdMismatch { found: chip_id });
        }

        // 软复位，等上电流程走完
        master
            .write_register(address, registers::RESET_REG, registers::RESET_VAL)
            .map_err(Bme280Error::Reset)?;
        delay.delay_ms(STARTUP_DELAY_MS);

        // 基线配置: 关闭IIR滤波器
        master
            .write_register(address, registers::CONFIG_REG, 0x00)
            .map_err(Bme280Error::Config)?;

        // 校准常数分两块读入，任何一步失败都不会留下部分常数
        let mut block1 = [0u8; registers::CALIB_BLOCK_1_LEN];
        master
            .select_register(address, registers::CALIB_BLOCK_1)
            .map_err(Bme280Error::CalibBlock1Select)?;
        master
            .receive_bytes(address, &mut block1)
            .map_err(Bme280Error::CalibBlock1Read)?;

        let mut block2 = [0u8; registers::CALIB_BLOCK_2_LEN];
        master
            .select_register(address, registers::CALIB_BLOCK_2)
            .map_err(Bme280Error::CalibBlock2Select)?;
        master
            .receive_bytes(address, &mut block2)
            .map_err(Bme280Error::CalibBlock2Read)?;

        let calib = Calibration::decode(&block1, &block2);

        // OK
        Ok(Self {
            master,
            delay,
            address,
            chip_id,
            calib,
        })
    }

    /// 初始化时记录下来的芯片ID
    pub fn chip_id(&self) -> u8 {
        self.chip_id
    }

    /// 已加载的校准常数
    pub fn calibration(&self) -> &Calibration {
        &self.calib
    }

    /// 取回总线端口(测试时用于检查仿真设备状态)
    pub fn release(self) -> B {
        self.master.release()
    }

    /// 触发一轮强制测量并等它完成
    ///
    /// ctrl_hum要先于ctrl_meas写入才会生效。写完后按激活通道数
    /// 查表阻塞等待最坏完成时间，不轮询器件的就绪标志
    pub fn start_measurement(
        &mut self,
        ovs_t: Oversampling,
        ovs_p: Oversampling,
        ovs_h: Oversampling,
    ) -> Result<(), Bme280Error> {
        self.master
            .write_register(
                self.address,
                registers::CONTROL_HUM_REG,
                registers::ctrl_hum_value(ovs_h),
            )
            .map_err(Bme280Error::MeasurementStart)?;
        self.master
            .write_register(
                self.address,
                registers::CONTROL_MEAS_REG,
                registers::ctrl_meas_value(ovs_t, ovs_p, Mode::Forced),
            )
            .map_err(Bme280Error::MeasurementStart)?;

        let wait = measurement_delay_ms(ovs_t, ovs_p, ovs_h);
        if wait > 0 {
            self.delay.delay_ms(wait);
        }
        // OK
        Ok(())
    }

    /// 读取原始温度值(只激活温度通道的一轮强制测量)
    pub fn read_raw_temperature(&mut self, ovs: Oversampling) -> Result<u32, Bme280Error> {
        self.start_measurement(ovs, Oversampling::Skip, Oversampling::Skip)?;

        self.master
            .select_register(self.address, registers::TEMP_REG)
            .map_err(Bme280Error::TemperatureSelect)?;
        let mut burst = [0u8; registers::TEMP_LEN];
        self.master
            .receive_bytes(self.address, &mut burst)
            .map_err(Bme280Error::TemperatureRead)?;

        // OK
        Ok(raw_temperature_from_burst(&burst))
    }

    /// 读取原始湿度值(只激活湿度通道的一轮强制测量)
    pub fn read_raw_humidity(&mut self, ovs: Oversampling) -> Result<u16, Bme280Error> {
        self.start_measurement(Oversampling::Skip, Oversampling::Skip, ovs)?;

        self.master
            .select_register(self.address, registers::HUM_REG)
            .map_err(Bme280Error::HumiditySelect)?;
        let mut burst = [0u8; registers::HUM_LEN];
        self.master
            .receive_bytes(self.address, &mut burst)
            .map_err(Bme280Error::HumidityRead)?;

        // OK
        Ok(raw_humidity_from_burst(&burst))
    }

    /// 读取补偿后的温度和湿度
    ///
    /// 温度与湿度各走一轮强制测量，时间上紧邻；
    /// 温度补偿产出的精细温度值直接喂给湿度补偿
    pub fn read(&mut self, ovs: Oversampling) -> Result<Measurement, Bme280Error> {
        let raw_temp = self.read_raw_temperature(ovs)?;
        let raw_hum = self.read_raw_humidity(ovs)?;

        let (temperature, t_fine) = compensate_temperature(raw_temp, &self.calib);
        let humidity = compensate_humidity(raw_hum, &self.calib, t_fine);

        // OK
        Ok(Measurement {
            temperature,
            humidity,
        })
    }
}
