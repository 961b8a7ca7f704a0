//! BME280定点补偿公式
//!
//! 数据手册4.2.3节规定的整数定点运算序列(移位、带符号乘法、钳位)，
//! 必须逐位复现厂商公式。两个函数都是纯函数，同样的整数输入
//! 必然得到同样的输出；温度补偿顺带产出的精细温度值
//! 是湿度补偿的必要输入。

use super::Calibration;

/// 补偿后温度的下限: -40.00℃(传感器工作范围)
const TEMPERATURE_MIN: i32 = -4000;
/// 补偿后温度的上限: 85.00℃
const TEMPERATURE_MAX: i32 = 8500;
/// 湿度累加器在最终右移前的上限，对应100%RH
const HUMIDITY_ACC_MAX: i32 = 419_430_400;

/// 精细温度值
///
/// 温度补偿的中间产物，湿度补偿依赖它做温度交叉补偿。
/// 字段私有: 只有[`compensate_temperature`]能构造出该值，
/// 从类型上保证湿度补偿拿到的温度信息来自同一轮(或相邻一轮)测量，
/// 而不是凭空捏造或过期的数值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TFine(i32);

impl TFine {
    pub fn value(self) -> i32 {
        self.0
    }
}

/// 温度补偿
///
/// 把20位原始温度ADC值换算成摄氏百分度(1/100℃)，同时产出精细温度值。
/// 结果钳位在传感器的标称工作范围[-40.00, 85.00]℃内
pub fn compensate_temperature(raw_temp: u32, calib: &Calibration) -> (i32, TFine) {
    // 温度补偿在32位有符号整型下进行
    let adc_t = raw_temp as i32;
    let dig_t1 = i32::from(calib.dig_t1);
    let dig_t2 = i32::from(calib.dig_t2);
    let dig_t3 = i32::from(calib.dig_t3);

    let var1 = (((adc_t >> 3) - (dig_t1 << 1)) * dig_t2) >> 11;
    let var2 = (((((adc_t >> 4) - dig_t1) * ((adc_t >> 4) - dig_t1)) >> 12) * dig_t3) >> 14;
    let t_fine = var1 + var2;

    let temperature = ((t_fine * 5 + 128) >> 8).clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);
    (temperature, TFine(t_fine))
}

/// 湿度补偿
///
/// 把16位原始湿度ADC值换算成Q22.10定点相对湿度(值/1024 = %RH)。
/// 累加器在最终右移12位之前钳位在[0, 419430400]，
/// 对应0到100%RH，因此结果必然落在[0, 102400]内
pub fn compensate_humidity(raw_hum: u16, calib: &Calibration, t_fine: TFine) -> u32 {
    // 湿度补偿在32位有符号整型下进行
    let adc_h = i32::from(raw_hum);
    let dig_h1 = i32::from(calib.dig_h1);
    let dig_h2 = i32::from(calib.dig_h2);
    let dig_h3 = i32::from(calib.dig_h3);
    let dig_h4 = i32::from(calib.dig_h4);
    let dig_h5 = i32::from(calib.dig_h5);
    let dig_h6 = i32::from(calib.dig_h6);

    let var1 = t_fine.value() - 76800;
    let var2 = (((adc_h << 14) - (dig_h4 << 20) - (dig_h5 * var1)) + 16384) >> 15;
    let var3 = (((var1 * dig_h6) >> 10) * (((var1 * dig_h3) >> 11) + 32768)) >> 10;
    let var4 = ((var3 + 2097152) * dig_h2 + 8192) >> 14;
    let mut acc = var2 * var4;
    acc -= ((((acc >> 15) * (acc >> 15)) >> 7) * dig_h1) >> 4;
    acc = acc.clamp(0, HUMIDITY_ACC_MAX);

    (acc >> 12) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 数据手册示例的温度校准三元组
    fn datasheet_temp_calib() -> Calibration {
        Calibration {
            dig_t1: 27504,
            dig_t2: 26435,
            dig_t3: -1000,
            ..Default::default()
        }
    }

    /// 退化的湿度校准: 只保留主灵敏度系数，其余通道归零，
    /// 让嵌套公式坍缩成可以手算核对的形状
    fn plain_hum_calib() -> Calibration {
        Calibration {
            dig_h2: 512,
            ..Default::default()
        }
    }

    /// 数据手册示例向量: adc_T=519888时温度为25.08℃
    #[test]
    fn temperature_matches_datasheet_vector() {
        let (temperature, t_fine) = compensate_temperature(519888, &datasheet_temp_calib());
        assert_eq!(temperature, 2508);
        assert_eq!(t_fine.value(), 128422);
    }

    /// 把公式推到下限之外的输入被钳位到-40.00℃
    #[test]
    fn temperature_clamps_at_lower_bound() {
        let (temperature, _) = compensate_temperature(0, &datasheet_temp_calib());
        assert_eq!(temperature, -4000);
    }

    /// 把公式推到上限之外的输入被钳位到85.00℃
    #[test]
    fn temperature_clamps_at_upper_bound() {
        let (temperature, _) = compensate_temperature(0xFFFFF, &datasheet_temp_calib());
        assert_eq!(temperature, 8500);
    }

    /// 整个20位ADC范围内的结果都落在[-4000, 8500]内
    #[test]
    fn temperature_stays_within_operating_range() {
        let calib = datasheet_temp_calib();
        for raw_temp in [0u32, 1, 0x10000, 519888, 0x80000, 0xFFFFF] {
            let (temperature, _) = compensate_temperature(raw_temp, &calib);
            assert!(
                (TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&temperature),
                "raw_temp={raw_temp} -> {temperature}"
            );
        }
    }

    /// 同样的输入必然得到同样的输出
    #[test]
    fn temperature_is_deterministic() {
        let calib = datasheet_temp_calib();
        let first = compensate_temperature(519888, &calib);
        let second = compensate_temperature(519888, &calib);
        assert_eq!(first, second);
    }

    /// 手算向量: dig_H2=512、精细温度76800(交叉项全部归零)时，
    /// adc_H=8191换算为65536/1024 = 64%RH
    #[test]
    fn humidity_matches_hand_computed_vector() {
        let humidity = compensate_humidity(8191, &plain_hum_calib(), TFine(76800));
        assert_eq!(humidity, 65536);
    }

    /// 非线性修正项: 在上面的向量基础上令dig_H1=64，
    /// 累加器被扣掉2097152，结果降为65024/1024 = 63.5%RH
    #[test]
    fn humidity_applies_nonlinear_correction() {
        let calib = Calibration {
            dig_h1: 64,
            dig_h2: 512,
            ..Default::default()
        };
        let humidity = compensate_humidity(8191, &calib, TFine(76800));
        assert_eq!(humidity, 65024);
    }

    /// 累加器超过上限时钳位，结果恰好为100%RH
    #[test]
    fn humidity_clamps_at_upper_bound() {
        let humidity = compensate_humidity(32768, &plain_hum_calib(), TFine(76800));
        assert_eq!(humidity, 102400);
    }

    /// 累加器为负时钳位到0%RH
    #[test]
    fn humidity_clamps_at_lower_bound() {
        let calib = Calibration {
            dig_h2: 512,
            dig_h4: 100,
            ..Default::default()
        };
        let humidity = compensate_humidity(0, &calib, TFine(76800));
        assert_eq!(humidity, 0);
    }

    /// 现实量级的校准常数下，任意原始值的结果都落在[0, 102400]内
    #[test]
    fn humidity_stays_within_q22_10_range() {
        let calib = Calibration {
            dig_h1: 75,
            dig_h2: 362,
            dig_h3: 4,
            dig_h4: 315,
            dig_h5: 50,
            dig_h6: 30,
            ..Default::default()
        };
        let t_fine = TFine(128422);
        for raw_hum in [0u16, 1, 1000, 8191, 30000, 65535] {
            let humidity = compensate_humidity(raw_hum, &calib, t_fine);
            assert!(humidity <= 102400, "raw_hum={raw_hum} -> {humidity}");
        }
    }

    #[test]
    fn humidity_is_deterministic() {
        let calib = plain_hum_calib();
        let first = compensate_humidity(8191, &calib, TFine(76800));
        let second = compensate_humidity(8191, &calib, TFine(76800));
        assert_eq!(first, second);
    }
}
