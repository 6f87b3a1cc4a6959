#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod klog;
pub mod ring_buffer;
pub mod testing;

#[doc(hidden)]
pub use paste;

pub use klog::{
    KlogLevel, klog_clear_backend, klog_get_level, klog_init, klog_is_enabled,
    klog_register_backend, klog_set_level,
};
pub use ring_buffer::RingBuffer;
