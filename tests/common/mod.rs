#![allow(dead_code)]

pub const KEY_ID: &str = "projects/cloudkms-test/locations/global/keyRings/KR/cryptoKeys/key1";
pub const KEY_ID_2: &str = "projects/cloudkms-test/locations/global/keyRings/KR/cryptoKeys/key2";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
