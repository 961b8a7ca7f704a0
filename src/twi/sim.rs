use super::{TwiBus, condition};

/// 故障注入点
///
/// 对应主机事务的五类成帧失败点。注入的故障是一次性的:
/// 第一次走到对应步骤时返回异常状态码，之后恢复正常。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// START条件不被授予
    Start,
    /// 写模式寻址阶段
    AddressWrite,
    /// 读模式寻址阶段
    AddressRead,
    /// 写数据阶段
    DataWrite,
    /// 读数据阶段(ACK或NACK)
    DataRead,
}

/// 总线原语调用记录，用于断言"中止后不再有总线活动"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Start,
    Write(u8),
    Read,
    Stop,
}

/// 事务阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// 总线空闲
    Idle,
    /// START已发出，下一个字节是从机地址
    Started,
    /// 写模式寻址完成; awaiting_reg为true时下一个字节是寄存器索引
    AddressedWrite { awaiting_reg: bool },
    /// 读模式寻址完成，后续read_byte按寄存器指针返回数据
    AddressedRead,
}

/// 仿真双线总线
///
/// 模拟一个挂在总线上的寄存器型从机:
/// 256字节寄存器文件加一个寄存器指针。写帧的第一个数据字节设置指针，
/// 后续字节写入指针所指寄存器并自增；读帧从指针处返回数据并自增。
/// 与真实硬件一样，状态码逐字节给出，主机据此决定是否继续。
pub struct SimTwiBus {
    /// 寄存器文件
    regs: [u8; 256],
    /// 从机的7位地址，寻址不匹配时回应NACK
    address: u8,
    /// 寄存器指针
    pointer: u8,
    phase: Phase,
    /// (故障点, 触发前还要跳过的匹配步骤数)
    fault: Option<(Fault, usize)>,
    /// 原语调用记录
    ops: Vec<Op>,
    /// 实际落到寄存器的写入记录(寄存器, 值)
    writes: Vec<(u8, u8)>,
}

impl SimTwiBus {
    pub fn new(address: u8) -> Self {
        Self {
            regs: [0u8; 256],
            address,
            pointer: 0,
            phase: Phase::Idle,
            fault: None,
            ops: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// 预置一段连续寄存器的内容
    pub fn load_registers(&mut self, start: u8, bytes: &[u8]) {
        for (offset, byte) in bytes.iter().enumerate() {
            self.regs[start.wrapping_add(offset as u8) as usize] = *byte;
        }
    }

    /// 注入一次性故障，第一次走到对应步骤时触发
    pub fn inject_fault(&mut self, fault: Fault) {
        self.inject_fault_nth(fault, 0);
    }

    /// 注入一次性故障，跳过前nth次匹配的步骤后触发
    ///
    /// 用于让故障落在事务序列深处的某一步，
    /// 例如初始化流程成功之后的第一次测量寄存器写入
    pub fn inject_fault_nth(&mut self, fault: Fault, nth: usize) {
        self.fault = Some((fault, nth));
    }

    /// 读取某个寄存器的当前值
    pub fn register(&self, reg: u8) -> u8 {
        self.regs[reg as usize]
    }

    /// 原语调用记录
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// 寄存器写入记录
    pub fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    /// 故障与当前步骤匹配时消耗掉它
    fn take_fault(&mut self, at: Fault) -> bool {
        match self.fault {
            Some((fault, 0)) if fault == at => {
                self.fault = None;
                true
            }
            Some((fault, remaining)) if fault == at => {
                self.fault = Some((fault, remaining - 1));
                false
            }
            _ => false,
        }
    }
}

impl TwiBus for SimTwiBus {
    fn start(&mut self) -> u8 {
        self.ops.push(Op::Start);
        if self.take_fault(Fault::Start) {
            self.phase = Phase::Idle;
            return condition::BUS_ERROR;
        }
        self.phase = Phase::Started;
        condition::START
    }

    fn write_byte(&mut self, byte: u8) -> u8 {
        self.ops.push(Op::Write(byte));
        match self.phase {
            // START之后的第一个字节是从机地址加读写位
            Phase::Started => {
                let read = (byte & 0b1) != 0;
                let fault_at = if read {
                    Fault::AddressRead
                } else {
                    Fault::AddressWrite
                };
                if self.take_fault(fault_at) {
                    self.phase = Phase::Idle;
                    return condition::BUS_ERROR;
                }
                // 地址不匹配的从机不会应答
                if (byte >> 1) != self.address {
                    self.phase = Phase::Idle;
                    return if read {
                        condition::ADDR_READ_NACK
                    } else {
                        condition::ADDR_WRITE_NACK
                    };
                }
                if read {
                    self.phase = Phase::AddressedRead;
                    condition::ADDR_READ_ACK
                } else {
                    self.phase = Phase::AddressedWrite { awaiting_reg: true };
                    condition::ADDR_WRITE_ACK
                }
            }
            Phase::AddressedWrite { awaiting_reg } => {
                if self.take_fault(Fault::DataWrite) {
                    self.phase = Phase::Idle;
                    return condition::BUS_ERROR;
                }
                if awaiting_reg {
                    // 第一个数据字节设置寄存器指针
                    self.pointer = byte;
                    self.phase = Phase::AddressedWrite { awaiting_reg: false };
                } else {
                    // 后续字节写入指针所指寄存器并自增
                    self.regs[self.pointer as usize] = byte;
                    self.writes.push((self.pointer, byte));
                    self.pointer = self.pointer.wrapping_add(1);
                }
                condition::DATA_WRITE_ACK
            }
            // 协议误用: 没有START或处于读帧时发送字节
            Phase::Idle | Phase::AddressedRead => condition::BUS_ERROR,
        }
    }

    fn read_byte(&mut self, ack: bool) -> (u8, u8) {
        self.ops.push(Op::Read);
        if self.phase != Phase::AddressedRead {
            return (0, condition::BUS_ERROR);
        }
        if self.take_fault(Fault::DataRead) {
            self.phase = Phase::Idle;
            return (0, condition::BUS_ERROR);
        }
        let byte = self.regs[self.pointer as usize];
        self.pointer = self.pointer.wrapping_add(1);
        let cond = if ack {
            condition::DATA_READ_ACK
        } else {
            condition::DATA_READ_NACK
        };
        (byte, cond)
    }

    fn stop(&mut self) {
        self.ops.push(Op::Stop);
        self.phase = Phase::Idle;
    }
}
