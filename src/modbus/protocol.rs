/// Function codes whose response length can be derived from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(FunctionCode::ReadCoils),
            0x02 => Some(FunctionCode::ReadDiscreteInputs),
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x05 => Some(FunctionCode::WriteSingleCoil),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x0F => Some(FunctionCode::WriteMultipleCoils),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }
}

/// Address + function code, the part of every response read first.
pub const RESPONSE_HEADER_LEN: usize = 2;

/// Exception response: address, function | 0x80, exception code, CRC.
pub const EXCEPTION_RESPONSE_LEN: usize = 5;

pub fn is_exception(function: u8) -> bool {
    function & 0x80 != 0
}

/// Full response frame length (CRC included) for a request, if the
/// function code determines it.
///
/// `request` is the payload as sent; a trailing CRC, if present, is
/// ignored because only the leading six bytes are inspected.
pub fn expected_response_len(request: &[u8]) -> Option<usize> {
    let function = FunctionCode::from_u8(*request.get(1)?)?;
    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let quantity = quantity(request)?;
            // address + function + byte count + data + CRC
            Some(5 + quantity.div_ceil(8))
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let quantity = quantity(request)?;
            Some(5 + quantity * 2)
        }
        FunctionCode::WriteSingleCoil
        | FunctionCode::WriteSingleRegister
        | FunctionCode::WriteMultipleCoils
        | FunctionCode::WriteMultipleRegisters => Some(8),
    }
}

fn quantity(request: &[u8]) -> Option<usize> {
    let bytes = request.get(4..6)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]) as usize)
}
