//! Library symlinks into the rclone mount
//!
//! Movies land in `movies/{Title} ({year}) {imdb-tt..}/` and episodes in
//! `shows/{Show} ({year}) {tt..}/Season NN/`. Anime goes to the `anime_`
//! variants of both.

use crate::error::ServiceError;
use crate::parser::parse_release;
use crate::services::{RunOutcome, Service, ServiceKind};
use crate::settings::SymlinkSettings;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use mediaferry_common::media::{ItemContext, ItemKind, ItemPath, MediaItem, MAX_SYMLINK_ATTEMPTS};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const LIBRARY_FOLDERS: [&str; 4] = ["movies", "shows", "anime_movies", "anime_shows"];

fn clean(name: &str) -> String {
    name.replace('/', "-")
}

fn with_year(title: &str, year: Option<i32>) -> String {
    match year {
        Some(year) => format!("{} ({})", clean(title), year),
        None => clean(title),
    }
}

fn extension(file: &str) -> &str {
    file.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("mkv")
}

/// `e01` or `e01-e03` when the file covers several episodes starting at `number`
fn episode_tag(number: u32, file: &str) -> String {
    let episodes = parse_release(file).episodes;
    match (episodes.first(), episodes.last()) {
        (Some(first), Some(last)) if *first == number && last > first => {
            format!("e{:02}-e{:02}", first, last)
        }
        _ => format!("e{:02}", number),
    }
}

pub struct Symlinker {
    library_path: PathBuf,
    rclone_path: PathBuf,
    initialized: bool,
}

impl Symlinker {
    pub fn new(settings: &SymlinkSettings) -> Self {
        let mut symlinker = Self {
            library_path: PathBuf::from(&settings.library_path),
            rclone_path: PathBuf::from(&settings.rclone_path),
            initialized: false,
        };
        symlinker.initialized = symlinker.validate();
        if symlinker.initialized {
            info!(
                rclone_path = %symlinker.rclone_path.display(),
                library_path = %symlinker.library_path.display(),
                "Symlinker initialized"
            );
        }
        symlinker
    }

    fn validate(&mut self) -> bool {
        for (name, path) in [("rclone_path", &self.rclone_path), ("library_path", &self.library_path)] {
            if path.as_os_str().is_empty() || path == Path::new(".") {
                debug!(setting = name, "Symlink path is not set");
                return false;
            }
            if !path.is_absolute() {
                error!(setting = name, path = %path.display(), "Symlink path is not absolute");
                return false;
            }
        }

        let all = self.rclone_path.join("__all__");
        let torrents = self.rclone_path.join("torrents");
        if all.is_dir() {
            debug!("Using __all__ folder of the rclone mount");
            self.rclone_path = all;
        } else if torrents.is_dir() {
            debug!("Using torrents folder of the rclone mount");
            self.rclone_path = torrents;
        }

        for folder in LIBRARY_FOLDERS {
            if let Err(e) = std::fs::create_dir_all(self.library_path.join(folder)) {
                error!(folder, error = %e, "Failed to create library folder");
                return false;
            }
        }
        true
    }

    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Whether another symlink attempt is allowed
    pub fn should_submit(&self, item: &MediaItem) -> bool {
        item.symlinked_times < MAX_SYMLINK_ATTEMPTS
    }

    /// Folder and file name of a movie or episode symlink
    fn destination(&self, ctx: &ItemContext<'_>) -> Option<(PathBuf, String)> {
        let node = ctx.target();
        let file = node.file.as_deref()?;
        let root = ctx.root;
        let year = root.year.or_else(|| root.aired_at.map(|a| a.year()));
        let imdb_id = root.imdb_id.as_deref()?;
        let title = root.title.as_deref().unwrap_or(imdb_id);

        match node.kind {
            ItemKind::Movie => {
                let category = if ctx.is_anime() { "anime_movies" } else { "movies" };
                let name = format!("{} {{imdb-{}}}", with_year(title, year), imdb_id);
                let folder = self.library_path.join(category).join(&name);
                Some((folder, format!("{}.{}", name, extension(file))))
            }
            ItemKind::Episode => {
                let season = ctx.season_number()?;
                let number = node.number?;
                let category = if ctx.is_anime() { "anime_shows" } else { "shows" };
                let show = with_year(title, year);
                let folder = self
                    .library_path
                    .join(category)
                    .join(format!("{} {{{}}}", show, imdb_id))
                    .join(format!("Season {:02}", season));
                let episode_title = node
                    .title
                    .as_deref()
                    .map(clean)
                    .unwrap_or_else(|| format!("Episode {}", number));
                let filename = format!(
                    "{} - s{:02}{} - {}.{}",
                    show,
                    season,
                    episode_tag(number, file),
                    episode_title,
                    extension(file)
                );
                Some((folder, filename))
            }
            _ => None,
        }
    }

    /// Folder on the mount holding the node's file
    async fn find_source(&self, node: &MediaItem) -> Option<(String, PathBuf)> {
        let file = node.file.as_deref()?;
        let candidates = [node.folder.as_deref(), node.alternative_folder.as_deref(), Some(file)];
        for folder in candidates.into_iter().flatten() {
            let source = self.rclone_path.join(folder).join(file);
            if tokio::fs::try_exists(&source).await.unwrap_or(false) {
                return Some((folder.to_string(), source));
            }
        }
        None
    }

    async fn link(source: &Path, folder: &Path, filename: &str) -> Result<PathBuf, ServiceError> {
        tokio::fs::create_dir_all(folder).await?;
        let destination = folder.join(filename);
        match tokio::fs::remove_file(&destination).await {
            Ok(()) => debug!(path = %destination.display(), "Replacing existing symlink"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::symlink(source, &destination).await?;
        Ok(destination)
    }

    /// Remove the symlinks of every movie or episode under `path`
    ///
    /// Folders left empty are pruned up to the library category folder.
    pub fn delete_item_symlinks(&self, root: &MediaItem, path: ItemPath) -> Result<usize, ServiceError> {
        let paths = match root.kind {
            ItemKind::Show => root
                .episode_paths()
                .into_iter()
                .filter(|p| path.overlaps(p))
                .collect(),
            _ => vec![ItemPath::ROOT],
        };

        let mut removed = 0;
        for leaf in paths {
            let Some((folder, filename)) = root.context(leaf).and_then(|ctx| self.destination(&ctx)) else {
                continue;
            };
            let destination = folder.join(&filename);
            if destination.symlink_metadata().is_ok() {
                std::fs::remove_file(&destination)?;
                removed += 1;
            }
            self.prune_empty(&folder);
        }
        info!(item = %root.item_id, removed, "Deleted symlinks");
        Ok(removed)
    }

    fn prune_empty(&self, folder: &Path) {
        let mut current = Some(folder);
        while let Some(dir) = current {
            let is_category = LIBRARY_FOLDERS.iter().any(|c| self.library_path.join(c) == dir);
            if is_category || !dir.starts_with(&self.library_path) {
                break;
            }
            let empty = std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(false);
            if !empty || std::fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl Service for Symlinker {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Symlinker
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    async fn run(&self, mut root: MediaItem, path: ItemPath) -> Result<Option<RunOutcome>, ServiceError> {
        let (log_string, destination, source) = {
            let ctx = root
                .context(path)
                .ok_or_else(|| ServiceError::InvalidItem(format!("{} has no node {}", root.item_id, path)))?;
            if !matches!(ctx.kind(), ItemKind::Movie | ItemKind::Episode) {
                return Ok(None);
            }
            (ctx.log_string(), self.destination(&ctx), self.find_source(ctx.target()).await)
        };

        let Some(node) = root.node_mut(path) else {
            return Ok(None);
        };
        node.symlinked_at = Some(Utc::now());
        node.symlinked_times += 1;

        match (source, destination) {
            (Some((folder, source)), Some((dest_folder, filename))) => {
                node.folder = Some(folder);
                match Self::link(&source, &dest_folder, &filename).await {
                    Ok(link) => {
                        debug!(item = %log_string, link = %link.display(), "Created symlink");
                        node.symlinked = true;
                        node.update_folder = Some(dest_folder.to_string_lossy().into_owned());
                    }
                    Err(e) => error!(item = %log_string, error = %e, "Failed to create symlink"),
                }
            }
            (None, _) => warn!(
                item = %log_string,
                rclone_path = %self.rclone_path.display(),
                attempt = node.symlinked_times,
                "File not found on the mount, maybe it failed to download"
            ),
            (_, None) => warn!(item = %log_string, "Not enough metadata to name the symlink"),
        }
        Ok(Some(RunOutcome::new(root, path)))
    }
}
