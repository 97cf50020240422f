//! Knowledge-base ingestion: extracted textbook text -> chunks -> embeddings -> index.
//!
//! Input is one plain-text file per book. Text is cleaned, cut into
//! heading-aware chunks with a word overlap, embedded one chunk at a time and
//! upserted in fixed-size batches. A chunk whose embedding fails is skipped;
//! an index write failure stops the book.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::providers::{Embedder, IndexRecord, IndexRecordMetadata, VectorIndex};
use crate::util::truncate_chars;

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
pub const MIN_CHUNK_SIZE: usize = 300;
pub const OVERLAP_WORDS: usize = 30;
/// Below this many chunks the paragraph pass is considered a failure.
pub const MIN_CHUNKS: usize = 5;
/// About 8000 tokens at four chars per token.
pub const MAX_EMBED_CHARS: usize = 32_000;
pub const METADATA_TEXT_CHARS: usize = 1000;
pub const BATCH_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
  pub text: String,
  pub book: String,
  pub chapter: String,
  pub section: String,
  pub chunk_id: usize,
}

struct Patterns {
  inline_ws: Regex,
  page_number: Regex,
  url: Regex,
  email: Regex,
  numbered: Regex,
}

fn patterns() -> &'static Patterns {
  static P: OnceLock<Patterns> = OnceLock::new();
  P.get_or_init(|| Patterns {
    inline_ws: Regex::new(r"[ \t\r\f\v]+").expect("static regex"),
    page_number: Regex::new(r"^\s*(?:Page\s+)?\d+\s*$").expect("static regex"),
    url: Regex::new(r"https?://\S+").expect("static regex"),
    email: Regex::new(r"\S+@\S+").expect("static regex"),
    numbered: Regex::new(r"^\d+\.").expect("static regex"),
  })
}

/// Normalize whitespace, drop page furniture, strip links, and unify quotes and dashes.
/// Paragraph breaks (blank lines) survive.
pub fn clean_text(text: &str) -> String {
  let p = patterns();
  let mut lines: Vec<String> = Vec::new();
  for line in text.lines() {
    if p.page_number.is_match(line) {
      continue;
    }
    let line = p.url.replace_all(line, "");
    let line = p.email.replace_all(&line, "");
    let line = p.inline_ws.replace_all(&line, " ");
    let line = line
      .replace(['\u{201C}', '\u{201D}'], "\"")
      .replace(['\u{2018}', '\u{2019}', '`'], "'")
      .replace(['\u{2014}', '\u{2013}'], "-");
    lines.push(line.trim().to_string());
  }

  // Collapse runs of blank lines and join non-blank runs into one paragraph line.
  let mut paragraphs: Vec<String> = Vec::new();
  let mut current: Vec<String> = Vec::new();
  for line in lines {
    if line.is_empty() {
      if !current.is_empty() {
        paragraphs.push(current.join(" "));
        current.clear();
      }
    } else {
      current.push(line);
    }
  }
  if !current.is_empty() {
    paragraphs.push(current.join(" "));
  }
  paragraphs.join("\n\n").trim().to_string()
}

fn is_heading(paragraph: &str) -> bool {
  if paragraph.chars().count() >= 100 {
    return false;
  }
  let lower = paragraph.to_lowercase();
  let has_letters = paragraph.chars().any(char::is_alphabetic);
  lower.contains("chapter")
    || lower.contains("section")
    || (has_letters && paragraph == paragraph.to_uppercase())
    || patterns().numbered.is_match(paragraph)
}

struct ChunkBuilder<'a> {
  book: &'a str,
  chunks: Vec<Chunk>,
  chapter: String,
  section: String,
}

impl ChunkBuilder<'_> {
  fn push(&mut self, text: &str) {
    let chunk_id = self.chunks.len();
    self.chunks.push(Chunk {
      text: text.trim().to_string(),
      book: self.book.to_string(),
      chapter: self.chapter.clone(),
      section: self.section.clone(),
      chunk_id,
    });
  }
}

/// Heading-aware paragraph chunking with a fixed-window fallback.
pub fn chunk_text(text: &str, book: &str) -> Vec<Chunk> {
  let cleaned = clean_text(text);
  let mut b = ChunkBuilder { book, chunks: Vec::new(), chapter: "Introduction".into(), section: String::new() };
  let mut current = String::new();

  for paragraph in cleaned.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
    if is_heading(paragraph) {
      if current.chars().count() >= MIN_CHUNK_SIZE {
        b.push(&current);
        current.clear();
      }
      if paragraph.to_lowercase().contains("chapter") {
        b.chapter = paragraph.to_string();
        b.section.clear();
      } else {
        b.section = paragraph.to_string();
      }
      continue;
    }

    let would_be = current.chars().count() + paragraph.chars().count() + 2;
    if would_be > CHUNK_SIZE && current.chars().count() >= MIN_CHUNK_SIZE {
      b.push(&current);
      let words: Vec<&str> = current.split_whitespace().collect();
      let overlap = words[words.len().saturating_sub(OVERLAP_WORDS)..].join(" ");
      current = format!("{}\n\n{}\n\n", overlap, paragraph);
    } else {
      current.push_str(paragraph);
      current.push_str("\n\n");
    }
  }
  if current.trim().chars().count() >= MIN_CHUNK_SIZE {
    b.push(&current);
  }

  let total_chars = cleaned.chars().count();
  if b.chunks.len() < MIN_CHUNKS && total_chars > CHUNK_SIZE * 2 {
    warn!(target: "ingest", %book, chunks = b.chunks.len(), "Too few chunks; re-chunking by fixed windows");
    return window_chunks(&cleaned, book);
  }
  b.chunks
}

fn window_chunks(cleaned: &str, book: &str) -> Vec<Chunk> {
  let chars: Vec<char> = cleaned.chars().collect();
  let stride = CHUNK_SIZE - CHUNK_OVERLAP;
  let mut chunks = Vec::new();
  let mut start = 0;
  while start < chars.len() {
    let end = (start + CHUNK_SIZE).min(chars.len());
    if end - start >= MIN_CHUNK_SIZE {
      let n = chunks.len();
      chunks.push(Chunk {
        text: chars[start..end].iter().collect(),
        book: book.to_string(),
        chapter: format!("Section {}", n / 10 + 1),
        section: format!("Part {}", n % 10 + 1),
        chunk_id: n,
      });
    }
    start += stride;
  }
  chunks
}

/// Stable id, so re-running ingestion overwrites instead of duplicating.
pub fn chunk_vector_id(chunk: &Chunk) -> String {
  let key = format!("{}_{}_{}", chunk.book, chunk.chunk_id, truncate_chars(&chunk.text, 100));
  Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

pub fn embedding_input(text: &str) -> &str {
  truncate_chars(text, MAX_EMBED_CHARS)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookReport {
  pub book: String,
  pub chunks: usize,
  pub upserted: usize,
  pub skipped: usize,
}

pub struct Ingestor<'a> {
  pub embedder: &'a dyn Embedder,
  pub index: &'a dyn VectorIndex,
  pub batch_size: usize,
  /// Pause between embedding calls, to stay under provider rate limits.
  pub embed_delay: Duration,
}

impl<'a> Ingestor<'a> {
  pub fn new(embedder: &'a dyn Embedder, index: &'a dyn VectorIndex) -> Self {
    Self { embedder, index, batch_size: BATCH_SIZE, embed_delay: Duration::from_millis(100) }
  }

  #[instrument(target = "ingest", level = "info", skip(self, book, text), fields(%book, text_len = text.len()))]
  pub async fn ingest_book(&self, book: &str, text: &str) -> Result<BookReport, ProviderError> {
    let chunks = chunk_text(text, book);
    let mut report = BookReport { book: book.to_string(), chunks: chunks.len(), ..Default::default() };
    info!(target: "ingest", %book, chunks = chunks.len(), "Chunked book");

    let batch_size = self.batch_size.max(1);
    let batches = chunks.len().div_ceil(batch_size);
    for (i, batch) in chunks.chunks(batch_size).enumerate() {
      info!(target: "ingest", %book, batch = i + 1, of = batches, "Embedding batch");
      let mut records = Vec::with_capacity(batch.len());
      for chunk in batch {
        match self.embedder.embed(embedding_input(&chunk.text)).await {
          Ok(values) => records.push(IndexRecord {
            id: chunk_vector_id(chunk),
            values,
            metadata: IndexRecordMetadata {
              book: chunk.book.clone(),
              chapter: chunk.chapter.clone(),
              section: chunk.section.clone(),
              chunk_id: chunk.chunk_id,
              text: truncate_chars(&chunk.text, METADATA_TEXT_CHARS).to_string(),
            },
          }),
          Err(e) => {
            warn!(target: "ingest", %book, chunk_id = chunk.chunk_id, error = %e, "Embedding failed; skipping chunk");
            report.skipped += 1;
          }
        }
        if !self.embed_delay.is_zero() {
          tokio::time::sleep(self.embed_delay).await;
        }
      }
      if !records.is_empty() {
        self.index.upsert(&records).await?;
        report.upserted += records.len();
      }
    }
    info!(target: "ingest", %book, upserted = report.upserted, skipped = report.skipped, "Book ingested");
    Ok(report)
  }

  /// Ingest every book found under `dir`, continuing past failed books.
  pub async fn ingest_dir(&self, dir: &Path) -> std::io::Result<Vec<BookReport>> {
    let mut reports = Vec::new();
    for (book, path) in discover_books(dir)? {
      let text = match tokio::fs::read_to_string(&path).await {
        Ok(t) => t,
        Err(e) => {
          error!(target: "ingest", %book, path = %path.display(), error = %e, "Failed to read book text");
          continue;
        }
      };
      match self.ingest_book(&book, &text).await {
        Ok(r) => reports.push(r),
        Err(e) => error!(target: "ingest", %book, error = %e, "Failed to upsert book"),
      }
    }
    match self.index.vector_count().await {
      Ok(n) => info!(target: "ingest", total_vectors = n, "Index now holds vectors"),
      Err(e) => warn!(target: "ingest", error = %e, "Could not read index stats"),
    }
    Ok(reports)
  }
}

/// Books are `<Book>.txt` files or `<Book>/<Book>_full_text.txt`, sorted by name.
pub fn discover_books(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
  let mut found = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_dir() {
      let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
      let full = path.join(format!("{}_full_text.txt", name));
      if full.is_file() {
        found.push((name.to_string(), full));
      }
    } else if path.extension().and_then(|e| e.to_str()) == Some("txt") {
      if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        let book = stem.strip_suffix("_full_text").unwrap_or(stem).to_string();
        found.push((book, path));
      }
    }
  }
  found.sort();
  Ok(found)
}
