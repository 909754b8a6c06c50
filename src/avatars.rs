//! Avatars on disk.
//!
//! One file per user, `avatar_<nickname>.<ext>`, directly under the store
//! root. Every write goes to its own temporary sibling first and is renamed
//! into place, so readers never see half a JPEG and concurrent uploads for
//! one nickname end with exactly one of them stored whole.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use crate::{
    encode::EncodedImage,
    primitive::{anyhow::Context, tracing::instrument, *},
};

/// Stored avatar with its last modified time.
///
/// Useful for HTTP caching.
#[derive(Debug)]
pub struct StoredAvatar {
    /// Last-Modified, if the file system knows it.
    pub lastmod: Option<DateTime>,
    /// The file contents. You can send this directly to the client.
    pub bytes: Vec<u8>,
}

/// Lowercase `nickname` and check it against `[a-z0-9_-]{1,64}`.
pub fn normalize_nickname(nickname: &str) -> Option<String> {
    let nick = nickname.trim().to_ascii_lowercase();
    let ok = (1..=64).contains(&nick.len())
        && nick
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    ok.then_some(nick)
}

/// File name for a nickname that already passed [`normalize_nickname`].
pub fn avatar_file_name(nickname: &str, ext: &str) -> String {
    format!("avatar_{nickname}.{ext}")
}

/// Decide if `name` could be something this store wrote.
pub fn is_avatar_file_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("avatar_") else {
        return false;
    };
    let Some((nick, ext)) = rest.rsplit_once('.') else {
        return false;
    };
    ext == "jpg" && normalize_nickname(nick).as_deref() == Some(nick)
}

/// A directory of avatars.
#[derive(Debug, Clone)]
pub struct AvatarStore {
    root: PathBuf,
}

impl AvatarStore {
    /// Use (and create if needed) `root`.
    pub async fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create avatar root {root:?}"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the avatar for `nickname`, returning the stored file name.
    #[instrument(err, skip(self, image))]
    pub async fn save(&self, nickname: &str, image: &EncodedImage) -> anyhow::Result<String> {
        let nick = normalize_nickname(nickname)
            .with_context(|| format!("bad nickname {nickname:?}"))?;
        let name = avatar_file_name(&nick, image.format.extension());
        let path = self.root.join(&name);
        let root = self.root.clone();
        let bytes = image.bytes.clone();

        // Sync block. The temp name is unique per call; last rename wins.
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".avatar_")
                .suffix(".tmp")
                .tempfile_in(&root)
                .with_context(|| format!("temp file in {root:?}"))?;
            tmp.write_all(&bytes)
                .with_context(|| format!("write {:?}", tmp.path()))?;
            tmp.persist(&path)
                .with_context(|| format!("persist avatar {path:?}"))?;
            Ok(())
        })
        .await
        .context("save: join error")??;
        tracing::info!("stored {name} ({} bytes)", image.bytes.len());
        Ok(name)
    }

    /// Read the avatar stored for `nickname`. `Ok(None)` if there is none
    /// or the nickname is not valid.
    pub async fn load(&self, nickname: &str) -> anyhow::Result<Option<StoredAvatar>> {
        match normalize_nickname(nickname) {
            Some(nick) => self.load_file(&avatar_file_name(&nick, "jpg")).await,
            None => Ok(None),
        }
    }

    /// Read a stored avatar by file name, as served over HTTP. `Ok(None)` if
    /// there is none or `name` is not one this store writes.
    #[instrument(err, level = "debug", skip(self))]
    pub async fn load_file(&self, name: &str) -> anyhow::Result<Option<StoredAvatar>> {
        if !is_avatar_file_name(name) {
            return Ok(None);
        }
        let path = self.root.join(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {path:?}")),
        };
        let lastmod = tokio::fs::metadata(&path)
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(systime2datetime);
        Ok(Some(StoredAvatar { lastmod, bytes }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::EncodedFormat;

    fn jpeg(tag: u8) -> EncodedImage {
        EncodedImage {
            bytes: vec![0xFF, 0xD8, tag],
            format: EncodedFormat::Jpeg,
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn nicknames() {
        assert_eq!(normalize_nickname(" Ann_01 ").as_deref(), Some("ann_01"));
        assert_eq!(normalize_nickname(""), None);
        assert_eq!(normalize_nickname("../etc"), None);
        assert_eq!(normalize_nickname("a b"), None);
        assert_eq!(normalize_nickname(&"x".repeat(65)), None);
    }

    #[test]
    fn file_names() {
        assert!(is_avatar_file_name("avatar_ann.jpg"));
        assert!(!is_avatar_file_name("avatar_Ann.jpg"));
        assert!(!is_avatar_file_name("avatar_ann.png"));
        assert!(!is_avatar_file_name("avatar_../x.jpg"));
        assert!(!is_avatar_file_name(".avatar_ann.jpg.tmp"));
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = AvatarStore::open(dir.path().join("avatars")).await.unwrap();
        let name = store.save("Ann", &jpeg(1)).await.unwrap();
        assert_eq!(name, "avatar_ann.jpg");

        let stored = store.load_file(&name).await.unwrap().unwrap();
        assert_eq!(stored.bytes, vec![0xFF, 0xD8, 1]);
        assert!(stored.lastmod.is_some());

        // Overwrite in place.
        store.save("ann", &jpeg(2)).await.unwrap();
        let stored = store.load("ANN").await.unwrap().unwrap();
        assert_eq!(stored.bytes, vec![0xFF, 0xD8, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_for_one_nickname() {
        fn payload(k: u8) -> Vec<u8> {
            vec![k; 200_000 + k as usize * 50_000]
        }

        let dir = tempfile::tempdir().unwrap();
        let store = AvatarStore::open(dir.path()).await.unwrap();
        for _ in 0..10 {
            let saves: Vec<_> = (0..8u8)
                .map(|k| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        let image = EncodedImage {
                            bytes: payload(k),
                            format: EncodedFormat::Jpeg,
                            width: 1,
                            height: 1,
                        };
                        store.save("ann", &image).await
                    })
                })
                .collect();
            for save in saves {
                assert_eq!(save.await.unwrap().unwrap(), "avatar_ann.jpg");
            }

            // Exactly one whole payload, never a mix.
            let stored = store.load("ann").await.unwrap().unwrap();
            assert_eq!(stored.bytes, payload(stored.bytes[0]));
        }

        // No temp files left behind.
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("avatar_ann.jpg")]);
    }

    #[tokio::test]
    async fn missing_and_foreign_names_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = AvatarStore::open(dir.path()).await.unwrap();
        assert!(store.load_file("avatar_bob.jpg").await.unwrap().is_none());
        assert!(store.load_file("secret.txt").await.unwrap().is_none());
        assert!(store.load("bob").await.unwrap().is_none());
        assert!(store.load("../bob").await.unwrap().is_none());
        assert!(store.save("no way", &jpeg(1)).await.is_err());
    }
}
