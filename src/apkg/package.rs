//! Package writer and reader.

use super::models::NoteType;
use super::schema;
use super::{ApkgError, Result};
use crate::card::{Card, CardMode, Deck};
use crate::pipeline::parse::cloze_numbers;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use zip::write::SimpleFileOptions;

const COLLECTION_ENTRY: &str = "collection.anki2";
const MEDIA_ENTRY: &str = "media";
const FIELD_SEPARATOR: &str = "\x1f";

/// Counts of what went into a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackageStats {
    pub deck_id: i64,
    pub notes: usize,
    pub cards: usize,
}

/// A note read back from a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageNote {
    pub note_type: String,
    pub fields: Vec<String>,
    /// Cards generated from this note.
    pub cards: usize,
}

/// Everything [`read_package`] recovers.
#[derive(Debug, Clone, Serialize)]
pub struct PackageContents {
    /// Deck names, excluding Anki's built-in "Default" deck.
    pub decks: Vec<String>,
    pub notes: Vec<PackageNote>,
}

impl PackageContents {
    pub fn card_count(&self) -> usize {
        self.notes.iter().map(|n| n.cards).sum()
    }
}

// ── Ids and checksums ────────────────────────────────────────────────────────

fn sha1_bytes(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

fn sha1_prefix_u64(data: &[u8]) -> u64 {
    let digest = sha1_bytes(data);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Deck id derived from the deck name, in `[2^30, 2^31)`.
///
/// Importing two packages built for the same deck name adds the notes to
/// one deck instead of creating "Name+" duplicates.
pub fn deck_id_for(name: &str) -> i64 {
    let h = sha1_prefix_u64(name.as_bytes());
    (1i64 << 30) + (h % (1u64 << 30)) as i64
}

const BASE91: &[u8; 91] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

fn base91(mut n: u64) -> String {
    if n == 0 {
        return (BASE91[0] as char).to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE91[(n % 91) as usize]);
        n /= 91;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Stable note guid: same note type, deck and fields → same guid, so a
/// re-import updates notes in place.
fn note_guid(note_type: &NoteType, deck_name: &str, fields: &[String]) -> String {
    let mut key = format!("{}__{}", note_type.id, deck_name);
    for f in fields {
        key.push_str("__");
        key.push_str(f);
    }
    base91(sha1_prefix_u64(key.as_bytes()))
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

fn strip_html(s: &str) -> String {
    RE_TAGS
        .replace_all(s, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Anki's duplicate-check checksum: first 8 hex digits of SHA-1 of the
/// stripped sort field.
fn field_checksum(sort_field: &str) -> i64 {
    let digest = sha1_bytes(sort_field.as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

/// Plain text → field HTML: escape markup characters, keep line breaks.
fn field_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>")
}

/// Inverse of [`field_html`]. `&amp;` is decoded last so `&amp;lt;` stays `&lt;`.
fn field_text(html: &str) -> String {
    html.replace("<br>", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Note fields (already HTML) and the card ordinals it produces.
fn note_fields(card: &Card, source: &str) -> (Vec<String>, Vec<i64>) {
    match card {
        Card::Basic { question, answer } => (
            vec![field_html(question), field_html(answer), field_html(source)],
            vec![0],
        ),
        Card::Cloze { text, extra } => {
            let ords: Vec<i64> = cloze_numbers(text)
                .into_iter()
                .map(|n| i64::from(n) - 1)
                .collect();
            let ords = if ords.is_empty() { vec![0] } else { ords };
            (
                vec![field_html(text), field_html(extra), field_html(source)],
                ords,
            )
        }
    }
}

fn build_collection(conn: &mut Connection, deck: &Deck) -> Result<PackageStats> {
    let now_ms = now_millis();
    let now_s = now_ms / 1000;
    let deck_id = deck_id_for(&deck.name);

    let note_types: Vec<&NoteType> = [CardMode::Basic, CardMode::Cloze]
        .into_iter()
        .filter(|mode| deck.cards.iter().any(|c| c.mode() == *mode))
        .map(NoteType::for_mode)
        .collect();
    let current_model = note_types
        .first()
        .map(|nt| nt.id)
        .unwrap_or(super::BASIC_NOTE_TYPE.id);

    conn.execute_batch(schema::CREATE_TABLES)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
         VALUES (1, ?1, ?2, ?2, ?3, 0, 0, 0, ?4, ?5, ?6, ?7, '{}')",
        params![
            now_s,
            now_ms,
            schema::SCHEMA_VERSION,
            schema::collection_conf(deck_id, current_model).to_string(),
            schema::models(&note_types, deck_id, now_s).to_string(),
            schema::decks(deck_id, &deck.name, now_s).to_string(),
            schema::deck_conf().to_string(),
        ],
    )?;

    let mut card_id = now_ms;
    let mut card_count = 0usize;
    {
        let mut insert_note = tx.prepare(
            "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
             VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')",
        )?;
        let mut insert_card = tx.prepare(
            "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                                reps, lapses, left, odue, odid, flags, data)
             VALUES (?1, ?2, ?3, ?4, ?5, -1, 0, 0, ?6, 0, 0, 0, 0, 0, 0, 0, 0, '')",
        )?;

        for (i, card) in deck.cards.iter().enumerate() {
            let note_type = NoteType::for_mode(card.mode());
            let note_id = now_ms + i as i64;
            let (fields, ords) = note_fields(card, &deck.source);
            let sort_field = strip_html(&fields[0]);

            insert_note.execute(params![
                note_id,
                note_guid(note_type, &deck.name, &fields),
                note_type.id,
                now_s,
                fields.join(FIELD_SEPARATOR),
                sort_field,
                field_checksum(&sort_field),
            ])?;

            for ord in ords {
                insert_card.execute(params![
                    card_id,
                    note_id,
                    deck_id,
                    ord,
                    now_s,
                    (i + 1) as i64,
                ])?;
                card_id += 1;
                card_count += 1;
            }
        }
    }
    tx.commit()?;

    Ok(PackageStats {
        deck_id,
        notes: deck.cards.len(),
        cards: card_count,
    })
}

/// Write `deck` as an `.apkg` archive into `writer`.
///
/// The collection database is built in a scratch directory and copied into
/// the archive; nothing else is touched on disk.
pub fn write_package<W: Write + Seek>(deck: &Deck, writer: W) -> Result<PackageStats> {
    let scratch = tempfile::tempdir()?;
    let db_path = scratch.path().join(COLLECTION_ENTRY);

    let stats = {
        let mut conn = Connection::open(&db_path)?;
        let stats = build_collection(&mut conn, deck)?;
        conn.close().map_err(|(_, e)| ApkgError::Database(e))?;
        stats
    };
    let db_bytes = std::fs::read(&db_path)?;

    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut zip = zip::ZipWriter::new(writer);
    zip.start_file(COLLECTION_ENTRY, options)?;
    zip.write_all(&db_bytes)?;
    zip.start_file(MEDIA_ENTRY, options)?;
    zip.write_all(b"{}")?;
    zip.finish()?;

    debug!(
        "Packaged deck '{}' (id {}): {} notes, {} cards, {} byte collection",
        deck.name,
        stats.deck_id,
        stats.notes,
        stats.cards,
        db_bytes.len()
    );
    Ok(stats)
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Open an `.apkg` archive and list its decks and notes in insertion order.
pub fn read_package(path: &Path) -> Result<PackageContents> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let scratch = tempfile::tempdir()?;
    let db_path = scratch.path().join(COLLECTION_ENTRY);
    {
        let mut entry = archive.by_name(COLLECTION_ENTRY)?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        std::fs::write(&db_path, bytes)?;
    }

    let conn = Connection::open(&db_path)?;
    let (models_json, decks_json): (String, String) =
        conn.query_row("SELECT models, decks FROM col LIMIT 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
    let models: serde_json::Value = serde_json::from_str(&models_json)?;
    let decks: serde_json::Value = serde_json::from_str(&decks_json)?;

    let mut deck_names: Vec<String> = decks
        .as_object()
        .ok_or_else(|| ApkgError::Invalid("col.decks is not an object".into()))?
        .iter()
        .filter(|(id, _)| id.as_str() != schema::DEFAULT_DECK_ID.to_string())
        .filter_map(|(_, d)| d["name"].as_str().map(str::to_string))
        .collect();
    deck_names.sort();

    let mut stmt = conn.prepare(
        "SELECT n.mid, n.flds, (SELECT COUNT(*) FROM cards c WHERE c.nid = n.id)
         FROM notes n ORDER BY n.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut notes = Vec::new();
    for row in rows {
        let (mid, flds, cards) = row?;
        let note_type = models[mid.to_string()]["name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        notes.push(PackageNote {
            note_type,
            fields: flds.split(FIELD_SEPARATOR).map(field_text).collect(),
            cards: cards as usize,
        });
    }

    Ok(PackageContents {
        decks: deck_names,
        notes,
    })
}
