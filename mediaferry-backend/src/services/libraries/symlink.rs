use crate::error::ServiceError;
use crate::parser::re;
use crate::services::ServiceKind;
use crate::settings::SymlinkSettings;
use mediaferry_common::media::MediaItem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

static IMDB_ID: Lazy<Regex> = Lazy::new(|| re(r"(tt\d+)"));
static SEASON_NUMBER: Lazy<Regex> = Lazy::new(|| re(r"(\d+)"));
static EPISODE_NUMBER: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)s\d+e(\d+)"));
/// `{Show} ({year}) - s01e02 - {Episode title}.ext`
static EPISODE_TITLE: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)s\d+e\d+(?:-e\d+)? - (.+)\.[a-z0-9]+$"));
static LEADING_TITLE: Lazy<Regex> = Lazy::new(|| re(r"^(.+?) \("));

fn imdb_id(text: &str) -> Option<String> {
    IMDB_ID.captures(text).map(|c| c[1].to_string())
}

fn episode_number(text: &str) -> Option<u32> {
    EPISODE_NUMBER.captures(text)?.get(1)?.as_str().parse().ok()
}

fn episode_title(text: &str) -> Option<String> {
    EPISODE_TITLE
        .captures(text)
        .or_else(|| LEADING_TITLE.captures(text))
        .map(|c| c[1].to_string())
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Rebuilds media items from a library made by the symlinker
pub struct SymlinkLibrary {
    library_path: PathBuf,
    initialized: bool,
}

impl SymlinkLibrary {
    pub fn new(settings: &SymlinkSettings) -> Self {
        let library_path = PathBuf::from(&settings.library_path);
        let initialized = Self::validate(&library_path);
        Self {
            library_path,
            initialized,
        }
    }

    fn validate(library_path: &Path) -> bool {
        if library_path.as_os_str().is_empty() || library_path == Path::new(".") {
            debug!("Symlink library path is not set");
            return false;
        }
        let missing: Vec<&str> = ["movies", "shows"]
            .into_iter()
            .filter(|d| !library_path.join(d).is_dir())
            .collect();
        if !missing.is_empty() {
            warn!(missing = ?missing, path = %library_path.display(), "Library is missing required folders");
            return false;
        }
        true
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    /// Scan the library on a blocking thread
    pub async fn run(&self) -> Result<Vec<MediaItem>, ServiceError> {
        if !self.initialized {
            return Ok(Vec::new());
        }
        let library_path = self.library_path.clone();
        let items = tokio::task::spawn_blocking(move || scan(&library_path))
            .await
            .map_err(|e| ServiceError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        info!(count = items.len(), "Found items in symlink library");
        Ok(items)
    }
}

fn scan(library_path: &Path) -> Vec<MediaItem> {
    let mut items = Vec::new();
    for (folder, anime) in [("movies", false), ("anime_movies", true)] {
        items.extend(scan_movies(&library_path.join(folder), anime));
    }
    for (folder, anime) in [("shows", false), ("anime_shows", true)] {
        items.extend(scan_shows(&library_path.join(folder), anime));
    }
    items
}

fn mark_linked(item: &mut MediaItem) {
    item.symlinked = true;
    item.update_folder = Some("updated".to_string());
}

fn scan_movies(dir: &Path, anime: bool) -> Vec<MediaItem> {
    let mut movies = Vec::new();
    for movie_dir in sorted_entries(dir).into_iter().filter(|p| p.is_dir()) {
        let Some(file) = sorted_entries(&movie_dir).into_iter().find(|p| !p.is_dir()) else {
            continue;
        };
        let filename = file_name(&file);
        let Some(id) = imdb_id(&filename).or_else(|| imdb_id(&file_name(&movie_dir))) else {
            warn!(path = %file.display(), "Cannot extract IMDb id from movie");
            continue;
        };
        let mut movie = MediaItem::movie(&id);
        movie.requested_by = Some(ServiceKind::SymlinkLibrary.key().to_string());
        movie.is_anime = anime;
        movie.file = Some(filename);
        movie.folder = Some(movie_dir.to_string_lossy().into_owned());
        mark_linked(&mut movie);
        movies.push(movie);
    }
    movies
}

fn scan_shows(dir: &Path, anime: bool) -> Vec<MediaItem> {
    let mut shows = Vec::new();
    for show_dir in sorted_entries(dir).into_iter().filter(|p| p.is_dir()) {
        let Some(id) = imdb_id(&file_name(&show_dir)) else {
            warn!(path = %show_dir.display(), "Cannot extract IMDb id from show");
            continue;
        };
        let mut show = MediaItem::show(&id);
        show.requested_by = Some(ServiceKind::SymlinkLibrary.key().to_string());
        show.is_anime = anime;

        for season_dir in sorted_entries(&show_dir).into_iter().filter(|p| p.is_dir()) {
            let Some(number) = SEASON_NUMBER
                .captures(&file_name(&season_dir))
                .and_then(|c| c[1].parse::<u32>().ok())
            else {
                warn!(path = %season_dir.display(), "Cannot extract season number");
                continue;
            };
            let mut season = MediaItem::season(number);
            for file in sorted_entries(&season_dir).into_iter().filter(|p| !p.is_dir()) {
                let filename = file_name(&file);
                let Some(episode_number) = episode_number(&filename) else {
                    warn!(path = %file.display(), "Cannot extract episode number");
                    continue;
                };
                let mut episode = MediaItem::episode(episode_number);
                episode.title = episode_title(&filename);
                episode.file = Some(filename);
                episode.folder = Some(season_dir.to_string_lossy().into_owned());
                mark_linked(&mut episode);
                season.add_child(episode);
            }
            if !season.children.is_empty() {
                show.add_child(season);
            }
        }
        shows.push(show);
    }
    shows
}
