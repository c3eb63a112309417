//! Native catalog records
//!
//! The shape every backend adapter decodes its wire payloads into before
//! mapping. Fields mirror what remote catalog services return: everything is
//! optional, durations are in seconds, and `starred` carries the favorite flag.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogArtist {
    pub id: Option<String>,
    pub name: Option<String>,
    pub sort_name: Option<String>,
    pub album_count: Option<i64>,
    pub song_count: Option<i64>,
    pub cover_art_id: Option<String>,
    #[serde(default)]
    pub starred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogAlbum {
    pub id: Option<String>,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i64>,
    pub song_count: Option<i64>,
    pub cover_art_id: Option<String>,
    #[serde(default)]
    pub starred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSong {
    pub id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub artist_id: Option<String>,
    pub album: Option<String>,
    pub album_id: Option<String>,
    /// Seconds.
    pub duration: Option<i64>,
    pub track: Option<i64>,
    pub disc_number: Option<i64>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub cover_art_id: Option<String>,
    #[serde(default)]
    pub starred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPlaylist {
    pub id: Option<String>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub song_count: Option<i64>,
    /// Seconds.
    pub duration: Option<i64>,
    pub cover_art_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogGenre {
    pub value: Option<String>,
    pub song_count: Option<i64>,
    pub album_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_decodes_camel_case_payload() {
        let song: CatalogSong = serde_json::from_str(
            r#"{"id":"tr-1","title":"Hoppípolla","artistId":"ar-1","discNumber":1,"duration":268,"starred":true}"#,
        )
        .unwrap();

        assert_eq!(song.id.as_deref(), Some("tr-1"));
        assert_eq!(song.artist_id.as_deref(), Some("ar-1"));
        assert_eq!(song.disc_number, Some(1));
        assert_eq!(song.duration, Some(268));
        assert!(song.starred);
        assert!(song.album.is_none());
    }

    #[test]
    fn test_missing_starred_defaults_to_false() {
        let artist: CatalogArtist = serde_json::from_str(r#"{"name":"Björk"}"#).unwrap();
        assert!(!artist.starred);
    }
}
