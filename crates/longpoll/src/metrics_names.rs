//! Metric names recorded by the poll loop.

/// Poll requests issued
pub const POLLS_TOTAL: &str = "vkbridge_longpoll_polls_total";
/// Update records handed to the subscriber
pub const UPDATES_DELIVERED_TOTAL: &str = "vkbridge_longpoll_updates_delivered_total";
/// Transient failures retried within the budget
pub const RETRIES_TOTAL: &str = "vkbridge_longpoll_retries_total";
/// `failed: 1` responses corrected in place
pub const CURSOR_CORRECTIONS_TOTAL: &str = "vkbridge_longpoll_cursor_corrections_total";
/// Sessions rebuilt after an unrecoverable failure
pub const REACQUISITIONS_TOTAL: &str = "vkbridge_longpoll_reacquisitions_total";
