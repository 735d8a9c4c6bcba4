use ach_core::error::AchError;
use ach_core::token_store::{self, Credential};
use std::fs::write;
use tempfile::tempdir;

#[test]
fn read_returns_none_when_file_is_absent() {
    let dir = tempdir().unwrap();
    let stored =
        token_store::read(&dir.path().join("token.json")).expect("absent file is not an error");
    assert!(stored.is_none());
}

#[test]
fn written_credential_reads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("token.json");

    token_store::write(&path, &Credential::new("abc.def.ghi")).expect("write should succeed");

    let stored = token_store::read(&path).unwrap().expect("credential should exist");
    assert_eq!(stored.token, "abc.def.ghi");
    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, r#"{"token":"abc.def.ghi"}"#);
}

#[test]
fn write_overwrites_existing_credential() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("token.json");
    token_store::write(&path, &Credential::new("first")).unwrap();
    token_store::write(&path, &Credential::new("second")).unwrap();

    assert_eq!(token_store::read(&path).unwrap().unwrap().token, "second");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1, "temp files must not be left behind");
}

#[test]
fn access_token_key_is_accepted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("token.json");
    write(&path, r#"{"accessToken": "from-elsewhere"}"#).unwrap();

    assert_eq!(token_store::read(&path).unwrap().unwrap().token, "from-elsewhere");
}

#[test]
fn invalid_json_is_a_corrupt_credential() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("token.json");
    write(&path, "{not json").unwrap();

    match token_store::read(&path) {
        Err(AchError::CorruptCredential { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected CorruptCredential, got {other:?}"),
    }
}

#[test]
fn wrong_shape_and_empty_token_are_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("token.json");

    write(&path, r#"{"something": "else"}"#).unwrap();
    assert!(matches!(
        token_store::read(&path),
        Err(AchError::CorruptCredential { .. })
    ));

    write(&path, r#"{"token": "  "}"#).unwrap();
    assert!(matches!(
        token_store::read(&path),
        Err(AchError::CorruptCredential { .. })
    ));
}

#[cfg(unix)]
#[test]
fn credential_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("token.json");
    token_store::write(&path, &Credential::new("secret")).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}
