mod lifecycle;
mod listener;
mod test_utils;

#[cfg(feature = "integration-tests")]
mod cloudflare_live;
