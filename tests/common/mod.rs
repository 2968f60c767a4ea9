//! Shared fixtures: a user-data store with the tables the merge plan touches.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::Connection;

pub const SCHEMA: &str = r#"
CREATE TABLE IndependentMedia (
    IndependentMediaId INTEGER NOT NULL PRIMARY KEY,
    OriginalFilename TEXT NOT NULL,
    FilePath TEXT NOT NULL UNIQUE,
    MimeType TEXT NOT NULL,
    Hash TEXT NOT NULL
);
CREATE TABLE Location (
    LocationId INTEGER NOT NULL PRIMARY KEY,
    BookNumber INTEGER,
    ChapterNumber INTEGER,
    DocumentId INTEGER,
    Track INTEGER,
    IssueTagNumber INTEGER NOT NULL DEFAULT 0,
    KeySymbol TEXT,
    MepsLanguage INTEGER,
    Type INTEGER NOT NULL,
    Title TEXT,
    UNIQUE (BookNumber, ChapterNumber, KeySymbol, MepsLanguage, Type),
    UNIQUE (KeySymbol, IssueTagNumber, MepsLanguage, DocumentId, Track, Type)
);
CREATE TABLE Tag (
    TagId INTEGER NOT NULL PRIMARY KEY,
    Type INTEGER NOT NULL,
    Name TEXT NOT NULL,
    UNIQUE (Type, Name)
);
CREATE TABLE InputField (
    LocationId INTEGER NOT NULL,
    TextTag TEXT NOT NULL,
    Value TEXT NOT NULL,
    FOREIGN KEY (LocationId) REFERENCES Location (LocationId),
    CONSTRAINT PK_InputField PRIMARY KEY (LocationId, TextTag)
);
CREATE TABLE Bookmark (
    BookmarkId INTEGER NOT NULL PRIMARY KEY,
    LocationId INTEGER NOT NULL,
    PublicationLocationId INTEGER NOT NULL,
    Slot INTEGER NOT NULL,
    Title TEXT NOT NULL,
    Snippet TEXT,
    BlockType INTEGER NOT NULL DEFAULT 0,
    BlockIdentifier INTEGER,
    UNIQUE (PublicationLocationId, Slot)
);
CREATE TABLE PlaylistItem (
    PlaylistItemId INTEGER NOT NULL PRIMARY KEY,
    Label TEXT NOT NULL,
    StartTrimOffsetTicks INTEGER,
    EndTrimOffsetTicks INTEGER,
    Accuracy INTEGER NOT NULL,
    EndAction INTEGER NOT NULL,
    ThumbnailFilePath TEXT
);
CREATE TABLE UserMark (
    UserMarkId INTEGER NOT NULL PRIMARY KEY,
    ColorIndex INTEGER NOT NULL,
    LocationId INTEGER NOT NULL,
    StyleIndex INTEGER NOT NULL,
    UserMarkGuid TEXT NOT NULL UNIQUE,
    Version INTEGER NOT NULL
);
CREATE TABLE BlockRange (
    BlockRangeId INTEGER NOT NULL PRIMARY KEY,
    BlockType INTEGER NOT NULL,
    Identifier INTEGER NOT NULL,
    StartToken INTEGER,
    EndToken INTEGER,
    UserMarkId INTEGER NOT NULL
);
CREATE TABLE Note (
    NoteId INTEGER NOT NULL PRIMARY KEY,
    Guid TEXT NOT NULL UNIQUE,
    UserMarkId INTEGER,
    LocationId INTEGER,
    Title TEXT,
    Content TEXT,
    LastModified TEXT NOT NULL DEFAULT '2024-01-01T00:00:00+00:00',
    Created TEXT NOT NULL DEFAULT '2024-01-01T00:00:00+00:00',
    BlockType INTEGER NOT NULL DEFAULT 0,
    BlockIdentifier INTEGER
);
CREATE TABLE PlaylistItemMarker (
    PlaylistItemMarkerId INTEGER NOT NULL PRIMARY KEY,
    PlaylistItemId INTEGER NOT NULL,
    Label TEXT NOT NULL,
    StartTimeTicks INTEGER NOT NULL,
    DurationTicks INTEGER NOT NULL,
    EndTransitionDurationTicks INTEGER NOT NULL,
    UNIQUE (PlaylistItemId, StartTimeTicks)
);
CREATE TABLE TagMap (
    TagMapId INTEGER NOT NULL PRIMARY KEY,
    PlaylistItemId INTEGER,
    LocationId INTEGER,
    NoteId INTEGER,
    TagId INTEGER NOT NULL,
    Position INTEGER NOT NULL,
    UNIQUE (TagId, Position),
    UNIQUE (TagId, NoteId),
    UNIQUE (TagId, LocationId),
    UNIQUE (TagId, PlaylistItemId)
);
CREATE TABLE PlaylistItemIndependentMediaMap (
    PlaylistItemId INTEGER NOT NULL,
    IndependentMediaId INTEGER NOT NULL,
    DurationTicks INTEGER NOT NULL,
    PRIMARY KEY (PlaylistItemId, IndependentMediaId)
);
CREATE TABLE PlaylistItemLocationMap (
    PlaylistItemId INTEGER NOT NULL,
    LocationId INTEGER NOT NULL,
    MajorMultimediaType INTEGER NOT NULL,
    BaseDurationTicks INTEGER,
    PRIMARY KEY (PlaylistItemId, LocationId)
);
CREATE TABLE PlaylistItemMarkerBibleVerseMap (
    PlaylistItemMarkerId INTEGER NOT NULL,
    VerseId INTEGER NOT NULL,
    PRIMARY KEY (PlaylistItemMarkerId, VerseId)
);
CREATE TABLE PlaylistItemMarkerParagraphMap (
    PlaylistItemMarkerId INTEGER NOT NULL,
    MepsDocumentId INTEGER NOT NULL,
    ParagraphIndex INTEGER NOT NULL,
    MarkerIndexWithinParagraph INTEGER NOT NULL,
    PRIMARY KEY (PlaylistItemMarkerId, MepsDocumentId, ParagraphIndex, MarkerIndexWithinParagraph)
);
"#;

/// In-memory store with the fixture schema and `data` applied.
pub fn memory_store(data: &str) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(data).unwrap();
    conn
}

/// On-disk store at `dir/userData.db` with the fixture schema and `data` applied.
pub fn file_store(dir: &Path, data: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("userData.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn.execute_batch(data).unwrap();
    path
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

/// `(LocationId, Title)` pairs ordered by id.
pub fn locations(conn: &Connection) -> Vec<(i64, String)> {
    let mut stmt = conn
        .prepare("SELECT LocationId, Title FROM Location ORDER BY LocationId")
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// A publication location identified by its title (the KeySymbol mirrors it).
pub fn location_sql(id: i64, title: &str) -> String {
    format!(
        "INSERT INTO Location (LocationId, KeySymbol, MepsLanguage, IssueTagNumber, DocumentId, Track, Type, Title) \
         VALUES ({id}, '{title}', 0, 0, 0, 0, 0, '{title}');"
    )
}

/// Build a `.jwlibrary` archive at `archive` from a staging directory holding
/// a database with `data`, a manifest, a thumbnail and the given media files.
pub fn backup_archive(staging: &Path, archive: &Path, data: &str, media: &[(&str, &[u8])]) {
    file_store(staging, data);
    std::fs::write(
        staging.join("manifest.json"),
        r#"{"name":"backup","version":1,"userDataBackup":{"hash":"stale","databaseName":"userData.db"}}"#,
    )
    .unwrap();
    std::fs::write(staging.join("default_thumbnail.png"), b"png").unwrap();
    for (name, bytes) in media {
        std::fs::write(staging.join(name), bytes).unwrap();
    }
    jwlibrary_merge::bundle::pack(staging, archive).unwrap();
}

/// `n` distinct locations, enough to grow a store by several pages.
pub fn many_locations(n: i64) -> String {
    (1..=n)
        .map(|i| location_sql(i, &format!("location-{:04}-{}", i, "x".repeat(64))))
        .collect()
}
