// builders + hooks + configuration
pub mod builders;
pub mod config;
pub mod hooks;

#[cfg(feature = "test-utils")]
pub mod test_utils;
