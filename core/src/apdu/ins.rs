pub const MANAGE_CHANNEL: u8 = 0x70;
pub const SELECT_FILE: u8 = 0xA4;
