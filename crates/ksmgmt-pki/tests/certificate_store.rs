mod common;

use common::{spki_der, to_pem, Fixture, TestCa, KEY_BITS};
use ksmgmt_key::{KeyPairProvider, MemoryKeyPairProvider};
use ksmgmt_pki::{
    cert::certificate_der,
    codes,
    encoding::{self, Framing},
    name::parse_name,
    CertStore, CryptoBackend, Csr, KeyProtectionLevel, NameStringMode, PkiError, SettingsStore,
};
use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};

const SUBJECT: &str = "CN=Alice, O=Cryptable, C=BE";
const CA_NAME: &str = "CN=Test CA, O=Cryptable, C=BE";

#[test]
fn test_certificate_request_binds_new_key() {
    let fixture = Fixture::new();
    let mut store = fixture.open();

    let request = store
        .create_certificate_request(SUBJECT, KEY_BITS, true)
        .unwrap();
    assert!(request.starts_with("-----BEGIN NEW CERTIFICATE REQUEST-----"));

    let csr = Csr::from_pem(&request).unwrap();
    assert_eq!(csr.subject_name(), SUBJECT);
    assert!(csr.verify_signature().unwrap());

    let key_id = store.last_key_id().unwrap().to_string();
    let key = fixture.keys.open_key_pair(&key_id).unwrap();
    assert_eq!(csr.public_key_info_der().unwrap(), key.public_key_info());
    assert!(key.flags().user_protected);

    store
        .create_certificate_request(SUBJECT, KEY_BITS, false)
        .unwrap();
    assert_ne!(store.last_key_id().unwrap(), key_id);
    assert_eq!(fixture.keys.len(), 2);
}

#[test]
fn test_invalid_subject_leaves_no_key() {
    let fixture = Fixture::new();
    let mut store = fixture.open();

    let err = store
        .create_certificate_request("NOPE=1", KEY_BITS, false)
        .unwrap_err();
    assert_eq!(err.code(), Some(codes::CRYPT_E_INVALID_X500_STRING));
    assert!(fixture.keys.is_empty());
}

#[test]
fn test_import_links_key_and_replaces_existing() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Utf8);
    let mut store = fixture.open();

    let request = store
        .create_certificate_request(SUBJECT, KEY_BITS, false)
        .unwrap();
    let pem = ca.sign_request(&request, &[0x1A]);

    store.import_certificate(&pem).unwrap();
    store.import_certificate(&pem).unwrap();

    let listed = store.certificates().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].subject, SUBJECT);
    assert_eq!(listed[0].issuer, CA_NAME);
    assert_eq!(listed[0].serial_number, "1A");
    assert!(listed[0].has_private_key);
    assert!(!listed[0].is_ca);

    // the entry points at the key pair generated for the request
    let key_id = store.last_key_id().unwrap();
    let key = fixture.keys.open_key_pair(key_id).unwrap();
    let contexts = fixture
        .backend
        .open_system_store("MY")
        .unwrap()
        .enumerate()
        .unwrap();
    assert_eq!(contexts.len(), 1);

    let provider = contexts[0].key_provider_info().unwrap();
    assert_eq!(provider.container_name, key_id);
    assert_eq!(provider.provider_name, fixture.keys.provider_name());
    assert_eq!(contexts[0].key_handle(), Some(key.handle()));
}

#[test]
fn test_import_without_key_and_failed_import() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Utf8);
    let mut store = fixture.open();

    let err = store.import_certificate("not a certificate").unwrap_err();
    assert!(matches!(
        err,
        PkiError::CryptoOperation {
            operation: "decode certificate",
            ..
        }
    ));

    // the store is still usable after a failed import
    store.import_certificate(&to_pem(&ca.certificate())).unwrap();

    let listed = store.certificates().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_ca);
    assert!(!listed[0].has_private_key);
}

#[test]
fn test_stores_share_entries() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Utf8);

    let mut first = fixture.open();
    first.import_certificate(&to_pem(&ca.certificate())).unwrap();
    drop(first);

    assert_eq!(fixture.open().certificates().unwrap().len(), 1);
    assert!(fixture.open_named("OTHER").certificates().unwrap().is_empty());
}

#[test]
fn test_pfx_export_import_roundtrip() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Utf8);
    let mut store = fixture.open();

    let request = store
        .create_certificate_request(SUBJECT, KEY_BITS, false)
        .unwrap();
    store
        .import_certificate(&ca.sign_request(&request, &[0x01, 0x02, 0x03]))
        .unwrap();

    let pfx = store.pfx_export(CA_NAME, "0x010203", "s3cret").unwrap();
    assert!(!pfx.contains("-----"));

    let mut other = fixture.open_named("ROUNDTRIP");
    assert_eq!(other.pfx_import(&pfx, "s3cret", true).unwrap(), 1);

    let original = &store.certificates().unwrap()[0];
    let imported = &other.certificates().unwrap()[0];
    assert_eq!(imported.issuer, original.issuer);
    assert_eq!(imported.serial_number, original.serial_number);
    assert_eq!(imported.thumbprint, original.thumbprint);
    assert!(imported.has_private_key);

    // the bundle carried the private key into a new container
    assert_eq!(fixture.keys.len(), 2);
}

#[test]
fn test_pfx_export_serial_forms() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Utf8);
    let mut store = fixture.open();

    let request = store
        .create_certificate_request(SUBJECT, KEY_BITS, false)
        .unwrap();
    store
        .import_certificate(&ca.sign_request(&request, &[0x0A, 0xBC]))
        .unwrap();

    for serial in ["abc", "0ABC", "0xabc", "0XABC"] {
        assert!(store.pfx_export(CA_NAME, serial, "pw").is_ok(), "serial {serial}");
    }

    let err = store.pfx_export(CA_NAME, "0xBC0A", "pw").unwrap_err();
    assert_eq!(err.code(), Some(codes::CRYPT_E_NOT_FOUND));

    let err = store.pfx_export(CA_NAME, "xyz", "pw").unwrap_err();
    assert_eq!(err.code(), Some(codes::ERROR_INVALID_PARAMETER));
}

#[test]
fn test_pfx_export_falls_back_to_printable_issuer() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Printable);
    let mut store = fixture.open();

    let request = store
        .create_certificate_request(SUBJECT, KEY_BITS, false)
        .unwrap();
    store
        .import_certificate(&ca.sign_request(&request, &[0x42]))
        .unwrap();

    let pfx = store.pfx_export(CA_NAME, "42", "pw").unwrap();
    assert!(!encoding::decode_any(&pfx).unwrap().is_empty());
}

#[test]
fn test_pfx_import_skips_ca_certificates() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Utf8);

    // leaf key generated on the issuing side
    let issuer_keys = MemoryKeyPairProvider::new();
    let leaf_key = issuer_keys
        .generate_key_pair("leaf", KEY_BITS, false)
        .unwrap();
    let leaf = ca.issue(
        &parse_name(SUBJECT, NameStringMode::Utf8).unwrap(),
        leaf_key.public_key_info(),
        &[0x77],
    );
    let ca_cert = ca.certificate();
    assert_eq!(spki_der(&leaf), leaf_key.public_key_info());

    let mut bundle = KeyStore::new();
    let chain = vec![
        p12_keystore::Certificate::from_der(&certificate_der(&leaf).unwrap()).unwrap(),
        p12_keystore::Certificate::from_der(&certificate_der(&ca_cert).unwrap()).unwrap(),
    ];
    bundle.add_entry(
        "leaf",
        KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(
            &issuer_keys.export_pkcs8_der(&leaf_key).unwrap(),
            [0x01u8],
            chain,
        )),
    );
    let pfx = bundle.writer("bundle").write().unwrap();

    let mut store = fixture.open();
    let imported = store
        .pfx_import(&encoding::encode(&pfx, Framing::Plain), "bundle", false)
        .unwrap();
    assert_eq!(imported, 1);

    let listed = store.certificates().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].subject, SUBJECT);
    assert!(listed.iter().all(|info| !info.is_ca));
    assert!(listed[0].has_private_key);
}

#[test]
fn test_pfx_import_wrong_password() {
    let fixture = Fixture::new();
    let ca = TestCa::new(CA_NAME, NameStringMode::Utf8);
    let mut store = fixture.open();

    let request = store
        .create_certificate_request(SUBJECT, KEY_BITS, false)
        .unwrap();
    store
        .import_certificate(&ca.sign_request(&request, &[0x05]))
        .unwrap();
    let pfx = store.pfx_export(CA_NAME, "05", "right").unwrap();

    let err = store.pfx_import(&pfx, "wrong", false).unwrap_err();
    assert_eq!(err.code(), Some(codes::ERROR_INVALID_PASSWORD));
    assert_eq!(store.certificates().unwrap().len(), 1);
}

#[test]
fn test_force_password_pin_protection_writes_once() {
    let fixture = Fixture::new();
    let store = fixture.open();
    let config = store.config().clone();

    store
        .force_password_pin_protection(KeyProtectionLevel::Required)
        .unwrap();
    store
        .force_password_pin_protection(KeyProtectionLevel::Required)
        .unwrap();

    assert_eq!(fixture.settings.write_count(), 1);
    assert_eq!(
        fixture
            .settings
            .get(&config.policy_path, &config.policy_value_name)
            .unwrap(),
        Some(2)
    );
    assert_eq!(store.key_protection_level(), KeyProtectionLevel::Required);
}

#[test]
fn test_policy_write_failure() {
    let fixture = Fixture::new();
    fixture.settings.set_read_only(true);
    let store = fixture.open();

    let err = store
        .force_password_pin_protection(KeyProtectionLevel::Required)
        .unwrap_err();
    assert!(matches!(err, PkiError::PolicyWrite { .. }));
}
