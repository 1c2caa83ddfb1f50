// Protocol constants for the Brother PP1

/// BLE service exposing the command/response characteristics
pub const SERVICE_UUID: &str = "a76eb9e0-f3ac-4990-84cf-3a94d2426b2b";

/// Characteristic commands are written to (write without response)
pub const WRITE_CHAR_UUID: &str = "a76eb9e2-f3ac-4990-84cf-3a94d2426b2b";

/// Characteristic the response to the last command is read from
pub const READ_CHAR_UUID: &str = "a76eb9e1-f3ac-4990-84cf-3a94d2426b2b";

/// Size of the echoed command id at the start of every frame (2 bytes)
pub const COMMAND_HEADER_SIZE: usize = 2;

/// Size of one PEN record (4 bytes)
pub const PEN_RECORD_SIZE: usize = 4;

/// Number of records in a lock stitch set
pub const LOCK_STITCH_COUNT: usize = 8;

/// Size of a lock stitch set (32 bytes)
pub const LOCK_STITCH_BYTES: usize = LOCK_STITCH_COUNT * PEN_RECORD_SIZE;

/// Largest absolute coordinate, in 0.1 mm units, that survives the 3-bit shift
pub const MAX_COORDINATE: i32 = 4095;

/// Jumps longer than this (0.1 mm units) get lock stitches and a cut
pub const LONG_JUMP_THRESHOLD: f64 = 50.0;

/// Length of the direction vector used for lock stitches
pub const LOCK_DIRECTION_LENGTH: f64 = 8.0;

/// Lock stitch offset as a fraction of the direction vector (0.4 units)
pub const LOCK_OFFSET_SCALE: f64 = 0.05;

/// Largest chunk sent in one SendData command, safely under the BLE MTU
pub const MAX_CHUNK_SIZE: usize = 500;

/// Data type announced in SendDataInfo for embroidery data
pub const DATA_TYPE_EMBROIDERY: u8 = 0x03;

/// Acknowledgement code: accepted / transfer complete
pub const RESPONSE_OK: u8 = 0x00;

/// SendData response code: more data expected
pub const RESPONSE_CONTINUE: u8 = 0x02;

/// Payload of the MaskTrace command
pub const MASK_TRACE_START: u8 = 0x01;
