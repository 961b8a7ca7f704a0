pub mod gpio;
pub mod sim;

/// 总线状态码(条件码)
///
/// 每个总线原语完成后，硬件状态寄存器会给出一个条件码，
/// 主机必须逐步核对条件码是否为该步骤的期望值，否则立即中止事务。
pub mod condition {
    /// START条件已发出
    pub const START: u8 = 0x08;
    /// 重复START条件已发出
    pub const REP_START: u8 = 0x10;
    /// 写模式寻址已被应答(SLA+W, ACK)
    pub const ADDR_WRITE_ACK: u8 = 0x18;
    /// 写模式寻址未被应答(SLA+W, NACK)
    pub const ADDR_WRITE_NACK: u8 = 0x20;
    /// 数据字节发送已被应答
    pub const DATA_WRITE_ACK: u8 = 0x28;
    /// 数据字节发送未被应答
    pub const DATA_WRITE_NACK: u8 = 0x30;
    /// 读模式寻址已被应答(SLA+R, ACK)
    pub const ADDR_READ_ACK: u8 = 0x40;
    /// 读模式寻址未被应答(SLA+R, NACK)
    pub const ADDR_READ_NACK: u8 = 0x48;
    /// 数据字节接收完成，主机已回应ACK
    pub const DATA_READ_ACK: u8 = 0x50;
    /// 数据字节接收完成，主机已回应NACK(最后一个字节)
    pub const DATA_READ_NACK: u8 = 0x58;
    /// 总线错误(非法的START/STOP，或底层引脚故障)
    pub const BUS_ERROR: u8 = 0x00;
}

/// 双线总线事务错误
///
/// 五类成帧失败点各对应一个变体，变体中携带实际观测到的状态码。
/// 本层不做任何重试，重试策略属于调用方。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwiError {
    /// START条件未被授予
    StartFailed(u8),
    /// 写模式下从机地址未被应答
    AddressWriteNack(u8),
    /// 读模式下从机地址未被应答
    AddressReadNack(u8),
    /// 写数据字节未被应答
    DataWriteNack(u8),
    /// 读数据阶段状态码异常(ACK或NACK阶段)
    DataReadNack(u8),
}

impl std::fmt::Display for TwiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartFailed(cond) => write!(f, "START条件未被授予(状态码: {:#04x})", cond),
            Self::AddressWriteNack(cond) => {
                write!(f, "写模式寻址未被应答(状态码: {:#04x})", cond)
            }
            Self::AddressReadNack(cond) => {
                write!(f, "读模式寻址未被应答(状态码: {:#04x})", cond)
            }
            Self::DataWriteNack(cond) => write!(f, "写数据未被应答(状态码: {:#04x})", cond),
            Self::DataReadNack(cond) => {
                write!(f, "读数据阶段状态异常(状态码: {:#04x})", cond)
            }
        }
    }
}

impl std::error::Error for TwiError {}

/// 双线总线端口抽象
///
/// 四个阻塞原语，每个原语都会一直等待到硬件状态更新后才返回条件码。
/// 没有超时：总线卡死时调用方会被无限期挂起，这是目标环境的既定属性。
/// 不同后端(位敲击GPIO、仿真总线)实现该trait后即可替换，
/// 上层主机协议与传感器逻辑无需改动。
pub trait TwiBus {
    /// 发出START条件，返回条件码
    fn start(&mut self) -> u8;
    /// 发送一个字节(地址或数据)，返回条件码
    fn write_byte(&mut self, byte: u8) -> u8;
    /// 接收一个字节；ack为true时主机回应ACK，为false时回应NACK
    /// 返回(收到的字节, 条件码)
    fn read_byte(&mut self, ack: bool) -> (u8, u8);
    /// 发出STOP条件，释放总线
    fn stop(&mut self);
}

impl<T: TwiBus + ?Sized> TwiBus for &mut T {
    fn start(&mut self) -> u8 {
        (**self).start()
    }

    fn write_byte(&mut self, byte: u8) -> u8 {
        (**self).write_byte(byte)
    }

    fn read_byte(&mut self, ack: bool) -> (u8, u8) {
        (**self).read_byte(ack)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// 双线总线主机
///
/// 在端口原语之上实现四种自成一帧的事务。每个事务内部完成自己的
/// START/寻址/应答/STOP流程，不可拆分、不可跨调用交错。
/// 任何一步的条件码与期望不符都会立刻中止事务并返回该步骤特有的错误，
/// 中止后不再发出STOP，也不再有任何总线活动。
pub struct TwiMaster<B: TwiBus> {
    bus: B,
}

impl<B: TwiBus> TwiMaster<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// 取回总线端口(测试时用于检查仿真设备状态)
    pub fn release(self) -> B {
        self.bus
    }

    /// 以写模式寻址从机
    ///
    /// 7位地址左移一位，最低位置0表示写操作
    fn address_write(&mut self, address: u8) -> Result<(), TwiError> {
        let cond = self.bus.write_byte((address << 1) & !0b1);
        if cond != condition::ADDR_WRITE_ACK {
            return Err(TwiError::AddressWriteNack(cond));
        }
        Ok(())
    }

    /// 以读模式寻址从机
    ///
    /// 7位地址左移一位，最低位置1表示读操作
    fn address_read(&mut self, address: u8) -> Result<(), TwiError> {
        let cond = self.bus.write_byte((address << 1) | 0b1);
        if cond != condition::ADDR_READ_ACK {
            return Err(TwiError::AddressReadNack(cond));
        }
        Ok(())
    }

    /// 发出START条件并校验
    fn start(&mut self) -> Result<(), TwiError> {
        let cond = self.bus.start();
        if cond != condition::START {
            return Err(TwiError::StartFailed(cond));
        }
        Ok(())
    }

    /// 向从机的指定寄存器写入一个字节
    ///
    /// 帧结构: START -> SLA+W -> 寄存器索引 -> 数据 -> STOP
    pub fn write_register(&mut self, address: u8, reg: u8, value: u8) -> Result<(), TwiError> {
        self.start()?;
        self.address_write(address)?;

        // 第一个数据字节是寄存器索引
        let cond = self.bus.write_byte(reg);
        if cond != condition::DATA_WRITE_ACK {
            return Err(TwiError::DataWriteNack(cond));
        }

        // 第二个数据字节是要写入的值
        let cond = self.bus.write_byte(value);
        if cond != condition::DATA_WRITE_ACK {
            return Err(TwiError::DataWriteNack(cond));
        }

        self.bus.stop();
        // OK
        Ok(())
    }

    /// 把从机内部的寄存器指针拨到指定寄存器，为随后的读取做准备
    ///
    /// 帧结构: START -> SLA+W -> 寄存器索引 -> STOP
    pub fn select_register(&mut self, address: u8, reg: u8) -> Result<(), TwiError> {
        self.start()?;
        self.address_write(address)?;

        let cond = self.bus.write_byte(reg);
        if cond != condition::DATA_WRITE_ACK {
            return Err(TwiError::DataWriteNack(cond));
        }

        self.bus.stop();
        // OK
        Ok(())
    }

    /// 从从机接收单个字节
    ///
    /// 帧结构: START -> SLA+R -> 数据(NACK) -> STOP
    /// 只读一个字节，因此主机直接回应NACK表示这是最后一个字节
    pub fn receive_byte(&mut self, address: u8) -> Result<u8, TwiError> {
        self.start()?;
        self.address_read(address)?;

        let (byte, cond) = self.bus.read_byte(false);
        if cond != condition::DATA_READ_NACK {
            return Err(TwiError::DataReadNack(cond));
        }

        self.bus.stop();
        // OK
        Ok(byte)
    }

    /// 从从机连续接收多个字节
    ///
    /// 帧结构: START -> SLA+R -> 前n-1个字节(ACK) -> 最后一个字节(NACK) -> STOP
    /// 目标缓冲区不足2个字节时退化为单字节路径
    pub fn receive_bytes(&mut self, address: u8, storage: &mut [u8]) -> Result<(), TwiError> {
        if storage.is_empty() {
            return Ok(());
        }
        if storage.len() < 2 {
            storage[0] = self.receive_byte(address)?;
            return Ok(());
        }

        self.start()?;
        self.address_read(address)?;

        // 前n-1个字节以ACK回应，告诉从机继续发送
        let last = storage.len() - 1;
        for slot in storage[..last].iter_mut() {
            let (byte, cond) = self.bus.read_byte(true);
            if cond != condition::DATA_READ_ACK {
                return Err(TwiError::DataReadNack(cond));
            }
            *slot = byte;
        }

        // 最后一个字节以NACK回应，告诉从机传输到此为止
        let (byte, cond) = self.bus.read_byte(false);
        if cond != condition::DATA_READ_NACK {
            return Err(TwiError::DataReadNack(cond));
        }
        storage[last] = byte;

        self.bus.stop();
        // OK
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::sim::{Fault, Op, SimTwiBus};
    use super::{TwiError, TwiMaster, condition};

    const ADDR: u8 = 0x76;

    fn master() -> TwiMaster<SimTwiBus> {
        TwiMaster::new(SimTwiBus::new(ADDR))
    }

    /// 写寄存器成功后，仿真设备中的寄存器值应当更新，且帧以STOP收尾
    #[test]
    fn write_register_updates_device() {
        let mut master = master();
        master.write_register(ADDR, 0xF5, 0xA5).unwrap();

        let bus = master.release();
        assert_eq!(bus.register(0xF5), 0xA5);
        assert_eq!(bus.ops().last(), Some(&Op::Stop));
    }

    /// 选择寄存器后连续读取，应按寄存器指针自增返回数据
    #[test]
    fn receive_bytes_reads_sequential_registers() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.load_registers(0x88, &[0x11, 0x22, 0x33, 0x44]);
        let mut master = TwiMaster::new(bus);

        master.select_register(ADDR, 0x88).unwrap();
        let mut buffer = [0u8; 4];
        master.receive_bytes(ADDR, &mut buffer).unwrap();
        assert_eq!(buffer, [0x11, 0x22, 0x33, 0x44]);
    }

    /// 单字节接收
    #[test]
    fn receive_byte_reads_selected_register() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.load_registers(0xD0, &[0x60]);
        let mut master = TwiMaster::new(bus);

        master.select_register(ADDR, 0xD0).unwrap();
        assert_eq!(master.receive_byte(ADDR).unwrap(), 0x60);
    }

    /// 缓冲区长度为1时退化为单字节路径
    #[test]
    fn receive_bytes_degrades_to_single_byte() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.load_registers(0xFD, &[0x7F]);
        let mut master = TwiMaster::new(bus);

        master.select_register(ADDR, 0xFD).unwrap();
        let mut buffer = [0u8; 1];
        master.receive_bytes(ADDR, &mut buffer).unwrap();
        assert_eq!(buffer[0], 0x7F);

        // 空缓冲区是无操作的成功
        let mut empty: [u8; 0] = [];
        master.receive_bytes(ADDR, &mut empty).unwrap();
    }

    /// START失败: 事务以StartFailed中止，之后没有任何总线活动
    #[test]
    fn start_failure_aborts_without_further_activity() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.inject_fault(Fault::Start);
        let mut master = TwiMaster::new(bus);

        let err = master.write_register(ADDR, 0xF4, 0x25).unwrap_err();
        assert_eq!(err, TwiError::StartFailed(condition::BUS_ERROR));

        let bus = master.release();
        assert_eq!(bus.ops(), &[Op::Start]);
    }

    /// 写模式寻址未被应答
    #[test]
    fn address_write_nack_aborts() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.inject_fault(Fault::AddressWrite);
        let mut master = TwiMaster::new(bus);

        let err = master.write_register(ADDR, 0xF4, 0x25).unwrap_err();
        assert_eq!(err, TwiError::AddressWriteNack(condition::BUS_ERROR));

        let bus = master.release();
        assert_eq!(bus.ops(), &[Op::Start, Op::Write((ADDR << 1) & !0b1)]);
    }

    /// 读模式寻址未被应答
    #[test]
    fn address_read_nack_aborts() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.inject_fault(Fault::AddressRead);
        let mut master = TwiMaster::new(bus);

        let err = master.receive_byte(ADDR).unwrap_err();
        assert_eq!(err, TwiError::AddressReadNack(condition::BUS_ERROR));

        let bus = master.release();
        assert_eq!(bus.ops(), &[Op::Start, Op::Write((ADDR << 1) | 0b1)]);
    }

    /// 写数据未被应答: 寄存器索引字节与数据字节都属于同一失败类
    #[test]
    fn data_write_nack_aborts() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.inject_fault(Fault::DataWrite);
        let mut master = TwiMaster::new(bus);

        let err = master.write_register(ADDR, 0xF4, 0x25).unwrap_err();
        assert_eq!(err, TwiError::DataWriteNack(condition::BUS_ERROR));

        let bus = master.release();
        // 中止发生在寄存器索引字节之后，数据字节从未上线
        assert_eq!(
            bus.ops(),
            &[Op::Start, Op::Write((ADDR << 1) & !0b1), Op::Write(0xF4)]
        );
    }

    /// 读数据阶段状态异常
    #[test]
    fn data_read_fault_aborts() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.inject_fault(Fault::DataRead);
        let mut master = TwiMaster::new(bus);

        let err = master.receive_byte(ADDR).unwrap_err();
        assert_eq!(err, TwiError::DataReadNack(condition::BUS_ERROR));

        let bus = master.release();
        assert_eq!(
            bus.ops(),
            &[Op::Start, Op::Write((ADDR << 1) | 0b1), Op::Read]
        );
    }

    /// 多字节读取中途ACK阶段状态异常时，事务立即中止
    #[test]
    fn data_read_ack_phase_fault_aborts_burst() {
        let mut bus = SimTwiBus::new(ADDR);
        bus.load_registers(0x88, &[0x01, 0x02, 0x03]);
        bus.inject_fault(Fault::DataRead);
        let mut master = TwiMaster::new(bus);

        let mut buffer = [0u8; 3];
        let err = master.receive_bytes(ADDR, &mut buffer).unwrap_err();
        assert_eq!(err, TwiError::DataReadNack(condition::BUS_ERROR));

        let bus = master.release();
        // 第一个数据字节的ACK阶段就中止了
        assert_eq!(bus.ops().last(), Some(&Op::Read));
        assert_eq!(bus.ops().len(), 3);
    }

    /// 寻址了不存在的从机地址时，应报告寻址未被应答
    #[test]
    fn wrong_address_reports_nack() {
        let mut master = TwiMaster::new(SimTwiBus::new(ADDR));

        let err = master.write_register(0x77, 0xF4, 0x25).unwrap_err();
        assert_eq!(
            err,
            TwiError::AddressWriteNack(condition::ADDR_WRITE_NACK)
        );
    }
}
