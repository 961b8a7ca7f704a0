//! 双线总线(TWI)主机驱动与BME280环境传感器库
//!
//! - `twi`: 双线总线主机事务协议(起始/寻址/应答/停止逐步校验)
//! - `sensor`: 基于总线协议实现的传感器驱动
//! - 硬件后端面向树莓派(rppal)，测试后端为寄存器级仿真总线

pub mod open_drain_pin_wapper;
pub mod sensor;
pub mod std_clock;
pub mod twi;
