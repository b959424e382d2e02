//! Rebuild a document from an operation log file.
//!
//! Usage: `replay <log.json|log.jsonl|-> [doc_id]`
//!
//! The log is either a JSON array of rows or one JSON row per line, with
//! the `crdt_ops` column names. Rows for other documents are skipped. If
//! no doc id is given, the first row's is used. Prints the text, then a
//! summary on stderr. Set `RUST_LOG=debug` to watch the merge.

use std::error::Error;
use std::io::Read;

use stitch::Document;
use stitch::RawOperation;
use stitch::Replayed;
use stitch::crdt::primitives::DocId;
use stitch::crdt::validate::Validator;

fn parse(input: &str) -> Result<Vec<RawOperation>, serde_json::Error> {
    if input.trim_start().starts_with('[') {
        return serde_json::from_str(input);
    }
    return input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line))
        .collect();
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().ok_or("usage: replay <log.json|log.jsonl|-> [doc_id]")?;
    let input = match path.as_str() {
        "-" => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            input
        }
        path => std::fs::read_to_string(path)?,
    };

    let rows = parse(&input)?;
    let doc_id = match args.next() {
        Some(doc_id) => doc_id,
        None => match rows.first() {
            Some(row) => row.doc_id.clone(),
            None => return Err("log is empty".into()),
        },
    };

    let rows = rows.iter().filter(|row| row.doc_id == doc_id);
    let Replayed { document, rejected } = Document::replay(DocId::new(doc_id.as_str()), rows, &Validator::default());

    println!("{}", document.text());
    eprintln!("doc:         {}", doc_id);
    eprintln!("applied:     {}", document.applied_len());
    eprintln!("pending:     {}", document.pending_len());
    eprintln!("rejected:    {}", rejected);
    eprintln!("tombstones:  {}", document.tombstone_count());
    eprintln!("fingerprint: {}", document.fingerprint());
    return Ok(());
}
