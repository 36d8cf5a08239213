// COMMAND_ID is the byte that identifies a command frame sent to the sensor.
pub const COMMAND_ID: u8 = 0xB4;

// DATA_REPORT_ID is the byte that identifies a data report frame received from the sensor.
// This is used in active reporting mode or as a reply to the query data command.
pub const DATA_REPORT_ID: u8 = 0xC0;

// REPLY_ID is the byte that identifies a reply frame received from the sensor
// in response to a settings command.
pub const REPLY_ID: u8 = 0xC5;

// HEAD is the byte that marks the beginning of any frame (command or data).
pub const HEAD: u8 = 0xAA;

// TAIL is the byte that marks the end of any frame (command or data).
pub const TAIL: u8 = 0xAB;

/// Length of every frame received from the sensor.
pub const INBOUND_FRAME_LEN: usize = 10;

/// Length of every command frame sent to the sensor.
pub const OUTBOUND_FRAME_LEN: usize = 19;

/// Number of free data bytes in a command frame (offsets 4..=14).
pub const COMMAND_DATA_LEN: usize = 11;

// Setting ids, carried at offset 2 of both command frames and 0xC5 replies.
pub const SETTING_REPORTING_MODE: u8 = 0x02;
pub const SETTING_QUERY_DATA: u8 = 0x04;
pub const SETTING_SLEEP: u8 = 0x06;
pub const SETTING_FIRMWARE: u8 = 0x07;
pub const SETTING_WORKING_PERIOD: u8 = 0x08;

/// Upper bound of the working period setting, in minutes.
pub const MAX_WORKING_PERIOD: u8 = 30;

/// Number of execute/check cycles allowed for a single command.
pub const ALLOWED_RETRIES: u8 = 10;

/// Time between two execute/check cycles of the same command.
pub const COMMAND_RETRY_INTERVAL_MS: u64 = 150;

/// Inbound frames buffered between the transport and the runner.
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// Events buffered per subscriber before the oldest is dropped.
pub const EVENT_CAPACITY: usize = 4;

/// Maximum number of simultaneous event subscribers.
pub const MAX_SUBSCRIBERS: usize = 4;
