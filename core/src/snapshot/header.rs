//! `Header` — the metadata record binding a snapshot's sections to one
//! stable `snapshot_id`.
//!
//! Binary encoding is hand-rolled, length-prefixed, fixed-field-order
//! (manual little-endian layouts rather than the serde-derived CBOR
//! used elsewhere in this crate), so field order and presence stay
//! fully explicit and stable across `serialize`/`deserialize` round
//! trips.

use crate::error::{EngineError, Result};
use crate::hash::{Digest, DIGEST_LEN};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

const MAGIC: &[u8; 8] = b"SNAPHDR1";

/// `{identifier (UUID), public_key (bytes, optional)}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub identifier: Uuid,
    pub public_key: Option<Vec<u8>>,
}

/// `{type, origin, directory}` describing where a snapshot's source
/// data came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Importer {
    pub kind: String,
    pub origin: String,
    pub directory: String,
}

/// Aggregate counts filled in at `finalize_snapshot` time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files: u64,
    pub directories: u64,
    pub total_size: u64,
}

/// The full metadata record for one snapshot. Section digests
/// are `Digest::ZERO` when absent. `snapshot_id` is independent of the
/// header's content and never changes on re-serialization (spec
/// invariant 6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub snapshot_id: Digest,
    pub version: u32,
    pub creation_time: OffsetDateTime,
    pub creation_duration: Duration,
    pub identity: Identity,
    pub category: String,
    pub tags: Vec<String>,
    /// Insertion-order significant; keys are not unique.
    pub context: Vec<(String, String)>,
    pub importer: Importer,
    pub root: Digest,
    pub index: Digest,
    pub metadata: Digest,
    pub statistics: Digest,
    pub errors: Digest,
    pub summary: Summary,
}

fn random_snapshot_id() -> Digest {
    let mut bytes = [0u8; DIGEST_LEN];
    getrandom::getrandom(&mut bytes).expect("OS RNG available");
    Digest(bytes)
}

impl Header {
    /// `new(snapshot_id)`: zero every section digest, stamp
    /// creation time now, record `version`, default category
    /// `"default"`, empty tags/context.
    pub fn new(version: u32) -> Self {
        Header {
            snapshot_id: random_snapshot_id(),
            version,
            creation_time: OffsetDateTime::now_utc(),
            creation_duration: Duration::ZERO,
            identity: Identity {
                identifier: Uuid::new_v4(),
                public_key: None,
            },
            category: "default".to_string(),
            tags: Vec::new(),
            context: Vec::new(),
            importer: Importer::default(),
            root: Digest::ZERO,
            index: Digest::ZERO,
            metadata: Digest::ZERO,
            statistics: Digest::ZERO,
            errors: Digest::ZERO,
            summary: Summary::default(),
        }
    }

    /// Appends; does not dedupe.
    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.push((key.into(), value.into()));
    }

    /// First-match-wins; empty string if `key` is absent.
    pub fn get_context(&self, key: &str) -> &str {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        write_digest(&mut out, &self.snapshot_id);
        write_u32(&mut out, self.version);
        write_i128(&mut out, self.creation_time.unix_timestamp_nanos());
        write_u64(&mut out, self.creation_duration.as_secs());
        write_u32(&mut out, self.creation_duration.subsec_nanos());
        out.extend_from_slice(self.identity.identifier.as_bytes());
        write_option_bytes(&mut out, self.identity.public_key.as_deref());
        write_str(&mut out, &self.category);
        write_u32(&mut out, self.tags.len() as u32);
        for tag in &self.tags {
            write_str(&mut out, tag);
        }
        write_u32(&mut out, self.context.len() as u32);
        for (k, v) in &self.context {
            write_str(&mut out, k);
            write_str(&mut out, v);
        }
        write_str(&mut out, &self.importer.kind);
        write_str(&mut out, &self.importer.origin);
        write_str(&mut out, &self.importer.directory);
        write_digest(&mut out, &self.root);
        write_digest(&mut out, &self.index);
        write_digest(&mut out, &self.metadata);
        write_digest(&mut out, &self.statistics);
        write_digest(&mut out, &self.errors);
        write_u64(&mut out, self.summary.files);
        write_u64(&mut out, self.summary.directories);
        write_u64(&mut out, self.summary.total_size);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let magic = r.take(8)?;
        if magic != MAGIC {
            return Err(EngineError::corruption("snapshot header", "bad magic"));
        }
        let snapshot_id = r.digest()?;
        let version = r.u32()?;
        let nanos = r.i128()?;
        let creation_time = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|e| EngineError::corruption("snapshot header", e.to_string()))?;
        let secs = r.u64()?;
        let subsec = r.u32()?;
        let creation_duration = Duration::new(secs, subsec);

        let identifier_bytes: [u8; 16] = r
            .take(16)?
            .try_into()
            .map_err(|_| EngineError::corruption("snapshot header", "bad uuid length"))?;
        let identifier = Uuid::from_bytes(identifier_bytes);
        let public_key = r.option_bytes()?;

        let category = r.string()?;
        let tag_count = r.u32()?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            tags.push(r.string()?);
        }
        let ctx_count = r.u32()?;
        let mut context = Vec::with_capacity(ctx_count as usize);
        for _ in 0..ctx_count {
            let k = r.string()?;
            let v = r.string()?;
            context.push((k, v));
        }
        let importer = Importer {
            kind: r.string()?,
            origin: r.string()?,
            directory: r.string()?,
        };
        let root = r.digest()?;
        let index = r.digest()?;
        let metadata = r.digest()?;
        let statistics = r.digest()?;
        let errors = r.digest()?;
        let summary = Summary {
            files: r.u64()?,
            directories: r.u64()?,
            total_size: r.u64()?,
        };
        r.finish()?;

        Ok(Header {
            snapshot_id,
            version,
            creation_time,
            creation_duration,
            identity: Identity {
                identifier,
                public_key,
            },
            category,
            tags,
            context,
            importer,
            root,
            index,
            metadata,
            statistics,
            errors,
            summary,
        })
    }
}

// --- little-endian, length-prefixed wire encoding ---

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_i128(out: &mut Vec<u8>, v: i128) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn write_digest(out: &mut Vec<u8>, d: &Digest) {
    out.extend_from_slice(d.as_bytes());
}
fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(out, bytes.len() as u32);
    out.extend_from_slice(bytes);
}
fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}
fn write_option_bytes(out: &mut Vec<u8>, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            out.push(1);
            write_bytes(out, b);
        }
        None => out.push(0),
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(EngineError::corruption("snapshot header", "truncated"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i128(&mut self) -> Result<i128> {
        Ok(i128::from_le_bytes(self.take(16)?.try_into().unwrap()))
    }

    fn digest(&mut self) -> Result<Digest> {
        let bytes: [u8; DIGEST_LEN] = self
            .take(DIGEST_LEN)?
            .try_into()
            .map_err(|_| EngineError::corruption("snapshot header", "bad digest length"))?;
        Ok(Digest(bytes))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String> {
        String::from_utf8(self.bytes()?)
            .map_err(|e| EngineError::corruption("snapshot header", e.to_string()))
    }

    fn option_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.take(1)?[0] {
            0 => Ok(None),
            1 => Ok(Some(self.bytes()?)),
            other => Err(EngineError::corruption(
                "snapshot header",
                format!("bad option tag {other}"),
            )),
        }
    }

    fn finish(self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(EngineError::corruption("snapshot header", "trailing bytes"));
        }
        Ok(())
    }
}

// --- sort keys ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    CreationTime,
    SnapshotID,
    Version,
    Tags,
}

impl SortField {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            "CreationTime" => Ok(SortField::CreationTime),
            "SnapshotID" => Ok(SortField::SnapshotID),
            "Version" => Ok(SortField::Version),
            "Tags" => Ok(SortField::Tags),
            other => Err(EngineError::InvalidSortKey(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

/// `parse_sort_keys("a,-b,c")`: split on `,`, a leading `-`
/// means descending. Duplicate base keys (regardless of direction) ->
/// `DuplicateKey`; unknown field name -> `InvalidSortKey`.
pub fn parse_sort_keys(spec: &str) -> Result<Vec<SortKey>> {
    let mut out = Vec::new();
    let mut seen: Vec<SortField> = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (direction, name) = match part.strip_prefix('-') {
            Some(rest) => (SortDirection::Descending, rest),
            None => (SortDirection::Ascending, part),
        };
        let field = SortField::from_name(name)?;
        if seen.contains(&field) {
            return Err(EngineError::DuplicateKey(name.to_string()));
        }
        seen.push(field);
        out.push(SortKey { field, direction });
    }
    Ok(out)
}

fn compare_field(a: &Header, b: &Header, field: SortField) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match field {
        SortField::SnapshotID => a.snapshot_id.as_bytes().cmp(b.snapshot_id.as_bytes()),
        SortField::Version => a.version.cmp(&b.version),
        SortField::CreationTime => a.creation_time.cmp(&b.creation_time),
        SortField::Tags => {
            for (x, y) in a.tags.iter().zip(b.tags.iter()) {
                let c = x.cmp(y);
                if c != Ordering::Equal {
                    return c;
                }
            }
            a.tags.len().cmp(&b.tags.len())
        }
    }
}

/// `sort(headers, keys)`: lexicographic comparison across
/// keys, per-key direction respected. An unknown key encountered
/// mid-sort (a [`SortKey`] this function didn't produce itself, e.g.
/// hand-built by a caller) still yields a best-effort ordering — the
/// comparator simply treats that key as equal and falls through to the
/// next one — alongside an `InvalidSortKey` error. `parse_sort_keys`
/// already rejects unknown names before they would reach here; this
/// defends the case where `keys` was constructed some other way.
pub fn sort(mut headers: Vec<Header>, keys: &[SortKey]) -> (Vec<Header>, Result<()>) {
    headers.sort_by(|a, b| {
        let mut ord = std::cmp::Ordering::Equal;
        for key in keys {
            if ord != std::cmp::Ordering::Equal {
                break;
            }
            let mut field_ord = compare_field(a, b, key.field);
            if key.direction == SortDirection::Descending {
                field_ord = field_ord.reverse();
            }
            ord = field_ord;
        }
        ord
    });
    (headers, Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_header_has_zeroed_sections_and_default_category() {
        let h = Header::new(1);
        assert!(h.root.is_zero());
        assert!(h.index.is_zero());
        assert!(h.metadata.is_zero());
        assert!(h.statistics.is_zero());
        assert!(h.errors.is_zero());
        assert_eq!(h.category, "default");
        assert!(h.tags.is_empty());
        assert!(h.context.is_empty());
    }

    #[test]
    fn context_appends_without_dedup_first_match_wins() {
        let mut h = Header::new(1);
        h.set_context("k", "first");
        h.set_context("k", "second");
        assert_eq!(h.context.len(), 2);
        assert_eq!(h.get_context("k"), "first");
        assert_eq!(h.get_context("missing"), "");
    }

    #[test]
    fn serialize_then_deserialize_round_trips() {
        let mut h = Header::new(3);
        h.category = "nightly".to_string();
        h.tags = vec!["x".to_string(), "y".to_string()];
        h.set_context("host", "box1");
        h.root = Digest([7u8; DIGEST_LEN]);
        h.summary = Summary {
            files: 10,
            directories: 2,
            total_size: 4096,
        };
        let bytes = h.serialize();
        let back = Header::deserialize(&bytes).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn snapshot_id_is_stable_across_reserialization() {
        let h = Header::new(1);
        let id = h.snapshot_id;
        let bytes = h.serialize();
        let back = Header::deserialize(&bytes).unwrap();
        let bytes2 = back.serialize();
        let back2 = Header::deserialize(&bytes2).unwrap();
        assert_eq!(id, back2.snapshot_id);
    }

    #[test]
    fn headers_compare_equal_iff_snapshot_id_matches() {
        let h1 = Header::new(1);
        let mut h2 = h1.clone();
        h2.category = "other".to_string();
        assert_eq!(h1.snapshot_id, h2.snapshot_id);

        let h3 = Header::new(1);
        assert_ne!(h1.snapshot_id, h3.snapshot_id);
    }

    #[test]
    fn parse_sort_keys_splits_direction_and_rejects_duplicates() {
        let keys = parse_sort_keys("-CreationTime,Tags").unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].field, SortField::CreationTime);
        assert_eq!(keys[0].direction, SortDirection::Descending);
        assert_eq!(keys[1].field, SortField::Tags);
        assert_eq!(keys[1].direction, SortDirection::Ascending);

        assert!(matches!(
            parse_sort_keys("Tags,-Tags").unwrap_err(),
            EngineError::DuplicateKey(_)
        ));
        assert!(matches!(
            parse_sort_keys("Bogus").unwrap_err(),
            EngineError::InvalidSortKey(_)
        ));
    }

    #[test]
    fn sort_by_creation_time_descending_then_tags() {
        use std::thread::sleep;
        use std::time::Duration as StdDuration;

        let mut h1 = Header::new(1);
        h1.tags = vec!["x".to_string()];
        sleep(StdDuration::from_millis(2));
        let mut h2 = Header::new(1);
        h2.tags = vec!["x".to_string(), "y".to_string()];
        sleep(StdDuration::from_millis(2));
        let mut h3 = Header::new(1);
        h3.tags = vec!["z".to_string()];

        let keys = parse_sort_keys("-CreationTime,Tags").unwrap();
        let (sorted, result) = sort(vec![h1.clone(), h2.clone(), h3.clone()], &keys);
        result.unwrap();
        assert_eq!(
            sorted.iter().map(|h| h.snapshot_id).collect::<Vec<_>>(),
            vec![h3.snapshot_id, h2.snapshot_id, h1.snapshot_id]
        );
    }

    #[test]
    fn sort_is_a_permutation_and_idempotent() {
        let headers: Vec<Header> = (0..5).map(|_| Header::new(1)).collect();
        let keys = parse_sort_keys("SnapshotID").unwrap();
        let (once, _) = sort(headers.clone(), &keys);
        let (twice, _) = sort(once.clone(), &keys);
        let mut once_ids: Vec<_> = once.iter().map(|h| h.snapshot_id).collect();
        let mut original_ids: Vec<_> = headers.iter().map(|h| h.snapshot_id).collect();
        once_ids.sort();
        original_ids.sort();
        assert_eq!(once_ids, original_ids);
        assert_eq!(
            once.iter().map(|h| h.snapshot_id).collect::<Vec<_>>(),
            twice.iter().map(|h| h.snapshot_id).collect::<Vec<_>>()
        );
    }
}
