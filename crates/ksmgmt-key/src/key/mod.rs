pub mod rsa;

pub use self::rsa::{verify_with_spki_der, RsaKey, MAX_BITS, MIN_BITS};
