use std::process::Command;

fn worker(base_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cogflux-worker"));
    cmd.env("WEIGHTS_BASE_DIR", base_dir)
        .env_remove("HF_TOKEN")
        .env_remove("HF_PRIVATE_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn list_prints_weights_of_one_filetype() {
    let tmp = tempfile::tempdir().unwrap();
    let output = worker(tmp.path())
        .args(["list", "--filetype", ".cube"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.trim(), "Presetpro - Portra 800.cube");
}

#[test]
fn unknown_weight_exits_nonzero_with_catalog_link() {
    let tmp = tempfile::tempdir().unwrap();
    let output = worker(tmp.path())
        .args(["fetch", "nonexistent.safetensors"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nonexistent.safetensors unavailable"));
    assert!(stderr.contains("supported_weights.md"));
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn existing_weight_is_not_downloaded_again() {
    let tmp = tempfile::tempdir().unwrap();
    let clip = tmp.path().join("ComfyUI/models/clip");
    std::fs::create_dir_all(&clip).unwrap();
    std::fs::write(clip.join("clip_l.safetensors"), b"weights").unwrap();

    let output = worker(tmp.path())
        .args(["fetch", "clip_l.safetensors"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(std::fs::read(clip.join("clip_l.safetensors")).unwrap(), b"weights");
}

#[test]
fn invalid_timeout_config_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    let output = worker(tmp.path())
        .env("MIRROR_TIMEOUT_SECS", "forever")
        .args(["list"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("MIRROR_TIMEOUT_SECS"));
}

#[test]
fn delete_removes_weight_files() {
    let tmp = tempfile::tempdir().unwrap();
    let vae = tmp.path().join("ComfyUI/models/vae");
    std::fs::create_dir_all(&vae).unwrap();
    std::fs::write(vae.join("sdxl_vae.safetensors"), b"weights").unwrap();

    let output = worker(tmp.path())
        .args(["delete", "sdxl_vae.safetensors"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(!vae.join("sdxl_vae.safetensors").exists());
}
