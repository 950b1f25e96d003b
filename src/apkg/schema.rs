//! Collection database schema (Anki schema 11) and the JSON blobs stored in
//! the `col` row.

use super::models::NoteType;
use serde_json::{json, Value};

pub const SCHEMA_VERSION: i64 = 11;

/// Id of the built-in "Default" deck every collection carries.
pub const DEFAULT_DECK_ID: i64 = 1;

/// Id of the default deck options group.
pub const DEFAULT_CONF_ID: i64 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE col (
    id              integer primary key,
    crt             integer not null,
    mod             integer not null,
    scm             integer not null,
    ver             integer not null,
    dty             integer not null,
    usn             integer not null,
    ls              integer not null,
    conf            text not null,
    models          text not null,
    decks           text not null,
    dconf           text not null,
    tags            text not null
);

CREATE TABLE notes (
    id              integer primary key,
    guid            text not null,
    mid             integer not null,
    mod             integer not null,
    usn             integer not null,
    tags            text not null,
    flds            text not null,
    sfld            integer not null,
    csum            integer not null,
    flags           integer not null,
    data            text not null
);

CREATE TABLE cards (
    id              integer primary key,
    nid             integer not null,
    did             integer not null,
    ord             integer not null,
    mod             integer not null,
    usn             integer not null,
    type            integer not null,
    queue           integer not null,
    due             integer not null,
    ivl             integer not null,
    factor          integer not null,
    reps            integer not null,
    lapses          integer not null,
    left            integer not null,
    odue            integer not null,
    odid            integer not null,
    flags           integer not null,
    data            text not null
);

CREATE TABLE revlog (
    id              integer primary key,
    cid             integer not null,
    usn             integer not null,
    ease            integer not null,
    ivl             integer not null,
    lastIvl         integer not null,
    factor          integer not null,
    time            integer not null,
    type            integer not null
);

CREATE TABLE graves (
    usn             integer not null,
    oid             integer not null,
    type            integer not null
);

CREATE INDEX ix_notes_usn ON notes (usn);
CREATE INDEX ix_cards_usn ON cards (usn);
CREATE INDEX ix_revlog_usn ON revlog (usn);
CREATE INDEX ix_cards_nid ON cards (nid);
CREATE INDEX ix_cards_sched ON cards (did, queue, due);
CREATE INDEX ix_revlog_cid ON revlog (cid);
CREATE INDEX ix_notes_csum ON notes (csum);
"#;

/// Collection-wide settings (`col.conf`).
pub fn collection_conf(current_deck: i64, current_model: i64) -> Value {
    json!({
        "activeDecks": [current_deck],
        "addToCur": true,
        "collapseTime": 1200,
        "curDeck": current_deck,
        "curModel": current_model.to_string(),
        "dueCounts": true,
        "estTimes": true,
        "newBury": true,
        "newSpread": 0,
        "nextPos": 1,
        "sortBackwards": false,
        "sortType": "noteFld",
        "timeLim": 0
    })
}

/// Deck options groups (`col.dconf`): just the default group.
pub fn deck_conf() -> Value {
    json!({
        DEFAULT_CONF_ID.to_string(): {
            "autoplay": true,
            "id": DEFAULT_CONF_ID,
            "lapse": {
                "delays": [10],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0
            },
            "maxTaken": 60,
            "mod": 0,
            "name": "Default",
            "new": {
                "bury": true,
                "delays": [1, 10],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "replayq": true,
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            },
            "timer": 0,
            "usn": 0
        }
    })
}

fn deck_entry(id: i64, name: &str, mtime: i64) -> Value {
    json!({
        "collapsed": false,
        "conf": DEFAULT_CONF_ID,
        "desc": "",
        "dyn": 0,
        "extendNew": 10,
        "extendRev": 50,
        "id": id,
        "lrnToday": [0, 0],
        "mod": mtime,
        "name": name,
        "newToday": [0, 0],
        "revToday": [0, 0],
        "timeToday": [0, 0],
        "usn": -1
    })
}

/// Decks map (`col.decks`): the default deck plus the generated one.
pub fn decks(deck_id: i64, deck_name: &str, mtime: i64) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        DEFAULT_DECK_ID.to_string(),
        deck_entry(DEFAULT_DECK_ID, "Default", 0),
    );
    map.insert(deck_id.to_string(), deck_entry(deck_id, deck_name, mtime));
    Value::Object(map)
}

fn model_entry(note_type: &NoteType, deck_id: i64, mtime: i64) -> Value {
    let fields: Vec<Value> = note_type
        .fields
        .iter()
        .enumerate()
        .map(|(ord, name)| {
            json!({
                "font": "Arial",
                "media": [],
                "name": name,
                "ord": ord,
                "rtl": false,
                "size": 20,
                "sticky": false
            })
        })
        .collect();

    let mut model = json!({
        "css": note_type.css,
        "did": deck_id,
        "flds": fields,
        "id": note_type.id,
        "latexPost": "\\end{document}",
        "latexPre": "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n",
        "mod": mtime,
        "name": note_type.name,
        "sortf": 0,
        "tags": [],
        "tmpls": [{
            "afmt": note_type.afmt,
            "bafmt": "",
            "bqfmt": "",
            "did": null,
            "name": note_type.template_name,
            "ord": 0,
            "qfmt": note_type.qfmt
        }],
        "type": note_type.kind_code(),
        "usn": -1,
        "vers": []
    });
    if note_type.kind_code() == 0 {
        // The front renders whenever Question or Source is non-empty.
        model["req"] = json!([[0, "any", [0, 2]]]);
    }
    model
}

/// Models map (`col.models`) for the note types in use.
pub fn models(note_types: &[&NoteType], deck_id: i64, mtime: i64) -> Value {
    let map: serde_json::Map<String, Value> = note_types
        .iter()
        .map(|nt| (nt.id.to_string(), model_entry(nt, deck_id, mtime)))
        .collect();
    Value::Object(map)
}
