//! init, pin, push and checkout against a live server on an ephemeral port

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use stew::archive::read_archive;
use stew::ops::{self, SyncStatus};
use stew::sample::{apply_patches, compare_files};
use stew::transport::{Client, Server, ServerConfig};
use stew::{ChangeKind, Config, Remote, Repo, Version};
use tempfile::tempdir;
use tokio::sync::oneshot;

fn wav(samples: &[i16]) -> Vec<u8> {
    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&44_100u32.to_le_bytes());
    out.extend_from_slice(&88_200u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out
}

fn raw(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<stew::transport::server::Result<()>>,
}

async fn start_server(data_dir: &Path) -> Running {
    let server = Server::new(ServerConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        data_dir: data_dir.to_path_buf(),
        shutdown_grace: Duration::from_secs(2),
        ..ServerConfig::default()
    });
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(listener, async move {
        let _ = rx.await;
    }));

    Running { addr, stop, handle }
}

#[tokio::test]
async fn test_pin_push_checkout_roundtrip() {
    let dir = tempdir().unwrap();
    let running = start_server(&dir.path().join("data")).await;
    let server_url = format!("http://{}", running.addr);

    let project = dir.path().join("project");
    fs::create_dir_all(project.join("stems")).unwrap();
    let kick = wav(&(0..500).map(|i| (i * 13) as i16).collect::<Vec<_>>());
    let snare = wav(&(0..300).map(|i| (i * -7) as i16).collect::<Vec<_>>());
    fs::write(project.join("kick.wav"), &kick).unwrap();
    fs::write(project.join("stems/snare.wav"), &snare).unwrap();
    fs::write(project.join("notes.txt"), b"not tracked").unwrap();

    let config = Config::new(Remote::new(server_url.as_str(), "demo"));
    let (_, report) = ops::init(&project, config).unwrap();
    assert_eq!(report.version, Version::new(0, 1));
    assert_eq!(report.tracked, 2);

    let repo = Repo::open(&project).unwrap();

    // first pin: both files added
    let first = ops::pin_and_push(&repo, Some("two stems"), true).await.unwrap();
    assert_eq!(first.pinned.version, Version::new(0, 2));
    assert_eq!(first.pinned.count(ChangeKind::Added), 2);
    assert_eq!(first.pinned.count(ChangeKind::Removed), 0);
    assert_eq!(first.remote, SyncStatus::Pushed);

    // second pin: one removal, no file payload
    fs::remove_file(project.join("stems/snare.wav")).unwrap();
    let second = ops::pin_and_push(&repo, None, true).await.unwrap();
    assert_eq!(second.pinned.version, Version::new(0, 3));
    assert_eq!(second.pinned.count(ChangeKind::Removed), 1);
    assert_eq!(second.pinned.count(ChangeKind::Added), 0);
    assert_eq!(second.remote, SyncStatus::Pushed);

    let local = read_archive(&repo.archive_path(Version::new(0, 3))).unwrap();
    assert_eq!(local.message, "Pinned version 0.3");
    assert!(local.files.is_empty());

    // re-pushing a stored version is rejected
    assert!(ops::push_version(&repo, Version::new(0, 2)).await.is_err());

    let client = Client::from_config(repo.config()).unwrap();
    assert_eq!(
        client.list_pins().await.unwrap(),
        vec![Version::new(0, 2), Version::new(0, 3)]
    );
    assert_eq!(client.list_projects().await.unwrap(), vec!["demo"]);
    assert_eq!(client.project_info().await.unwrap().project, "demo");
    assert!(matches!(
        client.create_project().await,
        Err(stew::Error::Conflict(_))
    ));
    assert_eq!(
        client
            .fetch_file(Version::new(0, 2), "stems/snare.wav")
            .await
            .unwrap(),
        snare
    );

    // checkout 0.2 and unpack it elsewhere
    let restored = dir.path().join("restored");
    let checkout = ops::checkout(&repo, Version::new(0, 2), Some(&restored))
        .await
        .unwrap();
    assert!(checkout.archive.is_file());
    assert_eq!(checkout.extracted.len(), 2);
    assert_eq!(fs::read(restored.join("kick.wav")).unwrap(), kick);
    assert_eq!(fs::read(restored.join("stems/snare.wav")).unwrap(), snare);
    assert!(!restored.join("notes.txt").exists());

    let downloaded = read_archive(&checkout.archive).unwrap();
    assert_eq!(downloaded.message, "two stems");

    running.stop.send(()).unwrap();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_pin_survives_unreachable_remote() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("a.wav"), wav(&[1, 2, 3])).unwrap();

    let config = Config::new(Remote::new("http://127.0.0.1:9", "demo"));
    let (repo, _) = ops::init(&project, config).unwrap();

    let report = ops::pin_and_push(&repo, None, true).await.unwrap();
    assert_eq!(report.pinned.version, Version::new(0, 2));
    assert!(matches!(report.remote, SyncStatus::Failed(_)));
    assert!(repo.archive_path(Version::new(0, 2)).is_file());

    let entries = ops::log(&repo, None).unwrap();
    let versions: Vec<Version> = entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![Version::new(0, 1), Version::new(0, 2)]);
}

#[test]
fn test_compare_then_patch_reproduces_new_take() {
    let dir = tempdir().unwrap();
    let old: Vec<i16> = (0..64).collect();
    let mut new = old.clone();
    new[10] = -1;
    new[20] = -2;
    new.extend_from_slice(&[100, 101]);

    fs::write(dir.path().join("take_one.wav"), wav(&old)).unwrap();
    fs::write(dir.path().join("take_two.wav"), wav(&new)).unwrap();

    let out = dir.path().join("patches");
    let report = compare_files(
        &dir.path().join("take_one.wav"),
        &dir.path().join("take_two.wav"),
        &out,
    )
    .unwrap();
    assert_eq!(report.artifacts.len(), 2);

    let target = dir.path().join("take.raw");
    fs::write(&target, raw(&old)).unwrap();
    apply_patches(&target, &report.artifacts).unwrap();
    assert_eq!(fs::read(&target).unwrap(), raw(&new));
}
