use std::fs;

use assert_cmd::Command;

#[test]
fn bundles_an_image_into_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("disk.img");
    fs::write(&image_path, vec![0xA5u8; 10_000]).unwrap();
    let out = dir.path().join("bundle");

    Command::cargo_bin("ami-bundle")
        .unwrap()
        .arg("--image")
        .arg(&image_path)
        .arg("--name")
        .arg("disk")
        .arg("--account")
        .arg("123456789012")
        .arg("--region")
        .arg("us-east-1")
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let part = fs::read(out.join("disk.part.0")).unwrap();
    assert!(!part.is_empty());
    assert_eq!(part.len() % 16, 0, "parts hold AES-CBC ciphertext");

    let manifest = fs::read_to_string(out.join("disk.manifest.xml")).unwrap();
    assert!(manifest.starts_with("<?xml version='1.0'?><manifest>"));
    assert!(manifest.contains("<version>2007-10-10</version>"));
    assert!(manifest.contains("<size>10000</size>"));
    assert!(manifest.contains("<parts count=\"1\">"));
}

#[test]
fn rejects_a_missing_image() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("ami-bundle")
        .unwrap()
        .arg("--image")
        .arg(dir.path().join("does-not-exist.img"))
        .arg("--account")
        .arg("123456789012")
        .arg("--region")
        .arg("us-east-1")
        .arg("--out")
        .arg(dir.path().join("bundle"))
        .assert()
        .failure();
}
