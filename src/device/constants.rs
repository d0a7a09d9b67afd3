use uuid::Uuid;

/**
 * How long (milliseconds) a device stays in the Error status before it is reset to Disconnected.
 */
pub const ERROR_RESET_DELAY: u64 = 3000;

/**
 * How often (milliseconds) to look for an advertising peripheral while a device is being selected.
 */
pub const SCAN_POLL_DELAY: u64 = 1000;

/**
 * How long (milliseconds) device selection may take before it counts as rejected.
 */
pub const SELECTION_DEADLINE: u64 = 30000;

/**
 * How often (milliseconds) to check that a connected peripheral is still connected.
 */
pub const LINK_CHECK_DELAY: u64 = 1000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * Size of the event channel handed to each subscriber of a device session.
 */
pub const EVENT_CHANNEL_SIZE: usize = 128;

/**
 * The standard Bluetooth SIG heart rate service (0x180D)
 */
pub const HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/**
 * The standard heart rate measurement characteristic (0x2A37)
 */
pub const HEART_RATE_MEASUREMENT_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/**
 * The smart inhaler's airflow service
 */
pub const INHALER_SERVICE: Uuid = Uuid::from_u128(0x19b10000_e8f2_537e_4f6c_d104768a1214);

/**
 * The smart inhaler's airflow characteristic, notifies a raw u16 (little endian) per reading.
 */
pub const INHALER_AIRFLOW_CHARACTERISTIC: Uuid = Uuid::from_u128(0x19b10001_e8f2_537e_4f6c_d104768a1214);
