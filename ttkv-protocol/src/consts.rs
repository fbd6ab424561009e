//! Magic bytes, opcodes and flag bits for the two wire dialects.

/// Expiration sentinel meaning "never expires".
pub const EXPIRE_NONE: i64 = 0x7FFF_FFFF_FFFF_FFFF;

/// KT dialect constants.
///
/// A KT request starts with the operation magic byte followed by a `u32`
/// flags word. The server echoes the magic on success or answers with
/// [`kt::ERROR`].
pub mod kt {
    /// Magic byte for `set_bulk`.
    pub const SET_BULK: u8 = 0xB8;
    /// Magic byte for `remove_bulk`.
    pub const REMOVE_BULK: u8 = 0xB9;
    /// Magic byte for `get_bulk`.
    pub const GET_BULK: u8 = 0xBA;
    /// Magic byte for `play_script`.
    pub const PLAY_SCRIPT: u8 = 0xB4;
    /// Magic byte of an error reply.
    pub const ERROR: u8 = 0xBF;

    /// Flag bit asking the server to suppress its acknowledgment.
    pub const FLAG_NO_REPLY: u32 = 0x01;
}

/// TT dialect constants.
///
/// Every TT command starts with the two bytes `0xC8 op`. The first byte of
/// a reply is a status: [`tt::STATUS_OK`], [`tt::STATUS_MISS`], or a server
/// fault.
pub mod tt {
    /// First byte of every TT command.
    pub const MAGIC: u8 = 0xC8;

    pub const PUT: u8 = 0x10;
    pub const PUTKEEP: u8 = 0x11;
    pub const PUTCAT: u8 = 0x12;
    pub const PUTSHL: u8 = 0x13;
    pub const PUTNR: u8 = 0x18;
    pub const OUT: u8 = 0x20;
    pub const GET: u8 = 0x30;
    pub const MGET: u8 = 0x31;
    pub const VSIZ: u8 = 0x38;
    pub const ITERINIT: u8 = 0x50;
    pub const ITERNEXT: u8 = 0x51;
    pub const FWMKEYS: u8 = 0x58;
    pub const ADDINT: u8 = 0x60;
    pub const ADDDOUBLE: u8 = 0x61;
    pub const EXT: u8 = 0x68;
    pub const SYNC: u8 = 0x70;
    pub const OPTIMIZE: u8 = 0x71;
    pub const VANISH: u8 = 0x72;
    pub const COPY: u8 = 0x73;
    pub const RESTORE: u8 = 0x74;
    pub const SETMST: u8 = 0x78;
    pub const RNUM: u8 = 0x80;
    pub const SIZE: u8 = 0x81;
    pub const STAT: u8 = 0x88;
    pub const MISC: u8 = 0x90;

    /// Operation applied.
    pub const STATUS_OK: u8 = 0x00;
    /// Recoverable miss / did-not-apply.
    pub const STATUS_MISS: u8 = 0x01;

    /// `ext` option: lock the touched record while the script runs.
    pub const EXT_LOCK_RECORD: u32 = 0x1;
    /// `ext` option: lock the whole database while the script runs.
    pub const EXT_LOCK_GLOBAL: u32 = 0x2;

    /// `misc` option: do not write this command to the replication log.
    pub const MISC_NO_UPDATE_LOG: u32 = 0x1;

    // Index types accepted by the `setindex` misc command.
    pub const INDEX_LEXICAL: u32 = 0;
    pub const INDEX_DECIMAL: u32 = 1;
    pub const INDEX_TOKEN: u32 = 2;
    pub const INDEX_QGRAM: u32 = 3;
    pub const INDEX_OPTIMIZE: u32 = 9998;
    pub const INDEX_DELETE: u32 = 9999;
    pub const INDEX_KEEP: u32 = 1 << 24;

    // Condition operators for `search` expressions.
    pub const OP_STR_EQ: u32 = 0;
    pub const OP_STR_CONTAINS: u32 = 1;
    pub const OP_STR_STARTSWITH: u32 = 2;
    pub const OP_STR_ENDSWITH: u32 = 3;
    pub const OP_STR_ALL: u32 = 4;
    pub const OP_STR_ANY: u32 = 5;
    pub const OP_STR_ANYEXACT: u32 = 6;
    pub const OP_STR_REGEX: u32 = 7;
    pub const OP_NUM_EQ: u32 = 8;
    pub const OP_NUM_GT: u32 = 9;
    pub const OP_NUM_GE: u32 = 10;
    pub const OP_NUM_LT: u32 = 11;
    pub const OP_NUM_LE: u32 = 12;
    pub const OP_NUM_BETWEEN: u32 = 13;
    pub const OP_NUM_ANYEXACT: u32 = 14;
    pub const OP_FTS_PHRASE: u32 = 15;
    pub const OP_FTS_ALL: u32 = 16;
    pub const OP_FTS_ANY: u32 = 17;
    pub const OP_FTS_EXPRESSION: u32 = 18;
    pub const OP_NEGATE: u32 = 1 << 24;
    pub const OP_NOINDEX: u32 = 1 << 25;

    // Result orderings for `search` expressions.
    pub const ORDER_STR_ASC: u32 = 0;
    pub const ORDER_STR_DESC: u32 = 1;
    pub const ORDER_NUM_ASC: u32 = 2;
    pub const ORDER_NUM_DESC: u32 = 3;
}
