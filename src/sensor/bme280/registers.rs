//! BME280寄存器地址与位域布局
//!
//! 纯数据描述，没有任何行为。地址与常量取自Bosch BME280数据手册。

/// SDO引脚接地时的7位器件地址
pub const ADDRESS_GND: u8 = 0x76;
/// SDO引脚接VCC时的7位器件地址
pub const ADDRESS_VCC: u8 = 0x77;

/// 芯片ID寄存器(只读)
pub const CHIP_ID_REG: u8 = 0xD0;
/// 芯片ID固定值，上电后读取必须等于该值
pub const CHIP_ID: u8 = 0x60;

/// 软复位寄存器(只写)
pub const RESET_REG: u8 = 0xE0;
/// 写入该值触发完整的上电复位流程
pub const RESET_VAL: u8 = 0xB6;

/// 配置寄存器(IIR滤波器系数与待机时间)
pub const CONFIG_REG: u8 = 0xF5;

/// 湿度过采样控制寄存器
///
/// 注意: 对该寄存器的写入要在写ctrl_meas之后才生效
pub const CONTROL_HUM_REG: u8 = 0xF2;
/// 温度/压力过采样与工作模式控制寄存器
pub const CONTROL_MEAS_REG: u8 = 0xF4;

/// 校准常数第一块: 0x88起26字节(至0xA1)
pub const CALIB_BLOCK_1: u8 = 0x88;
pub const CALIB_BLOCK_1_LEN: usize = 26;
/// 校准常数第二块: 0xE1起8字节(至0xE8)
pub const CALIB_BLOCK_2: u8 = 0xE1;
pub const CALIB_BLOCK_2_LEN: usize = 8;

/// 温度输出寄存器: 0xFA起3字节，20位左对齐
pub const TEMP_REG: u8 = 0xFA;
pub const TEMP_LEN: usize = 3;
/// 湿度输出寄存器: 0xFD起2字节
pub const HUM_REG: u8 = 0xFD;
pub const HUM_LEN: usize = 2;

/// 过采样设置
///
/// 过采样倍数越高，噪声越小，但单次转换耗时越长。
/// 枚举值即寄存器位域中的3位编码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Oversampling {
    /// 跳过该通道，不进行测量
    Skip = 0b000,
    /// 1倍过采样
    X1 = 0b001,
    /// 2倍过采样
    X2 = 0b010,
    /// 4倍过采样
    X4 = 0b011,
    /// 8倍过采样
    X8 = 0b100,
    /// 16倍过采样
    X16 = 0b101,
}

impl Oversampling {
    /// 由过采样倍数构建
    ///
    /// 合法倍数为0(跳过)、1、2、4、8、16，
    /// 其它值一律回落到1倍(容错的默认值，不算错误)
    pub fn from_multiplier(multiplier: u8) -> Self {
        match multiplier {
            0 => Self::Skip,
            1 => Self::X1,
            2 => Self::X2,
            4 => Self::X4,
            8 => Self::X8,
            16 => Self::X16,
            _ => Self::X1,
        }
    }

    /// 该通道是否被跳过
    pub fn is_skip(&self) -> bool {
        *self == Self::Skip
    }

    /// 位域编码
    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

/// 工作模式(ctrl_meas寄存器最低2位)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// 休眠，不进行任何测量
    Sleep = 0b00,
    /// 强制模式: 每次触发只做一轮转换，完成后自动回到休眠
    Forced = 0b01,
    /// 连续测量模式
    Normal = 0b11,
}

impl Mode {
    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

/// 组装ctrl_meas寄存器值
///
/// 位布局: osrs_t[7:5] | osrs_p[4:2] | mode[1:0]
pub fn ctrl_meas_value(ovs_t: Oversampling, ovs_p: Oversampling, mode: Mode) -> u8 {
    (ovs_t.bits() << 5) | (ovs_p.bits() << 2) | mode.bits()
}

/// 组装ctrl_hum寄存器值
///
/// 位布局: osrs_h[2:0]
pub fn ctrl_hum_value(ovs_h: Oversampling) -> u8 {
    ovs_h.bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 合法倍数精确映射，非法倍数回落到1倍
    #[test]
    fn oversampling_from_multiplier_normalizes() {
        assert_eq!(Oversampling::from_multiplier(0), Oversampling::Skip);
        assert_eq!(Oversampling::from_multiplier(1), Oversampling::X1);
        assert_eq!(Oversampling::from_multiplier(2), Oversampling::X2);
        assert_eq!(Oversampling::from_multiplier(4), Oversampling::X4);
        assert_eq!(Oversampling::from_multiplier(8), Oversampling::X8);
        assert_eq!(Oversampling::from_multiplier(16), Oversampling::X16);
        // 不在合法集合内的值回落到1倍
        assert_eq!(Oversampling::from_multiplier(3), Oversampling::X1);
        assert_eq!(Oversampling::from_multiplier(7), Oversampling::X1);
        assert_eq!(Oversampling::from_multiplier(255), Oversampling::X1);
    }

    /// ctrl_meas位域布局: osrs_t[7:5] | osrs_p[4:2] | mode[1:0]
    #[test]
    fn ctrl_meas_bit_layout() {
        assert_eq!(
            ctrl_meas_value(Oversampling::X16, Oversampling::Skip, Mode::Forced),
            0b101_000_01
        );
        assert_eq!(
            ctrl_meas_value(Oversampling::X1, Oversampling::X1, Mode::Normal),
            0b001_001_11
        );
        assert_eq!(
            ctrl_meas_value(Oversampling::Skip, Oversampling::Skip, Mode::Sleep),
            0x00
        );
    }

    #[test]
    fn ctrl_hum_bit_layout() {
        assert_eq!(ctrl_hum_value(Oversampling::X16), 0b101);
        assert_eq!(ctrl_hum_value(Oversampling::Skip), 0b000);
    }
}
