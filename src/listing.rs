//! Human-readable and CSV file listings, in the style of `DIRECTORY`.

use crate::header::record::RecordFlags;
use crate::header::attribute::rattrib;
use crate::header::{FileAttributes, RecordFormat};
use crate::options::OutputType;
use crate::timestamp::VmsTime;

/// One listed file: its attributes plus the flags of the File record that
/// carried them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub attributes:   FileAttributes,
    pub record_flags: RecordFlags,
}

/// UCHAR bit pattern reported as "Contiguous best try".
const CONTIGUOUS_BEST_TRY: u16 = 0x20;

pub fn banner(save_set_name: &str, block_size: u32) -> String {
    format!("Save set:          {save_set_name}\nBlock size:        {block_size}\n")
}

/// Render `entry` for `output`; `None` when listing is suppressed.
pub fn render(entry: &FileEntry, output: OutputType) -> Option<String> {
    match output {
        OutputType::Suppress => None,
        OutputType::Brief    => Some(brief(entry)),
        OutputType::Full     => Some(full(entry)),
        OutputType::Csv      => Some(csv(entry)),
    }
}

// ── Field text ───────────────────────────────────────────────────────────────

/// Access letters granted by one protection nibble (a set bit denies).
pub fn protection_text(nibble: u8) -> String {
    [(0x1, 'R'), (0x2, 'W'), (0x4, 'E'), (0x8, 'D')]
        .iter()
        .filter(|(bit, _)| nibble & bit == 0)
        .map(|&(_, c)| c)
        .collect()
}

pub fn record_format_text(format: RecordFormat, record_size: u16) -> String {
    let maximum = |name: &str| {
        if record_size == 0 {
            name.to_string()
        } else {
            format!("{name}, maximum {record_size} bytes")
        }
    };
    match format {
        RecordFormat::Fix        => "Fixed length 512 byte records".to_string(),
        RecordFormat::Var        => maximum("Variable length"),
        RecordFormat::Vfc        => maximum("VFC, 2 byte header"),
        RecordFormat::Stm        => maximum("Stream"),
        RecordFormat::StmLf      => maximum("Stream_LF"),
        RecordFormat::StmCr      => maximum("Stream_CR"),
        RecordFormat::Udf | RecordFormat::Unknown(_) => String::new(),
    }
}

pub fn record_attributes_text(value: u8) -> String {
    match value {
        rattrib::FTN => "None".to_string(),
        rattrib::CRN => "Carriage return carriage control".to_string(),
        rattrib::PRN => "Print file carriage control".to_string(),
        rattrib::CR | rattrib::BLK => String::new(),
        n => format!("WARNING : Unknown attribute {n}"),
    }
}

fn organization(flags: RecordFlags) -> &'static str {
    if flags.non_sequential() { "????" } else { "Sequential" }
}

fn word(v: &[u16], i: usize) -> u16 {
    v.get(i).copied().unwrap_or(0)
}

fn byte(v: &[u8], i: usize) -> u8 {
    v.get(i).copied().unwrap_or(0)
}

fn contiguous_best_try(a: &FileAttributes) -> bool {
    word(&a.characteristics(), 0) == CONTIGUOUS_BEST_TRY
}

fn owner(a: &FileAttributes) -> (u16, u16) {
    let uic = a.uic();
    (word(&uic, 1), word(&uic, 0))
}

/// System, owner, group and world access.
fn protection(a: &FileAttributes) -> [String; 4] {
    let p = a.protection();
    [
        protection_text(byte(&p, 0) & 0x0F),
        protection_text(byte(&p, 0) >> 4),
        protection_text(byte(&p, 1) & 0x0F),
        protection_text(byte(&p, 1) >> 4),
    ]
}

fn date(t: VmsTime, digits: u32) -> String {
    t.format(digits)
}

// ── Layouts ──────────────────────────────────────────────────────────────────

pub fn brief(entry: &FileEntry) -> String {
    let a = &entry.attributes;
    format!(
        "{}\n                      Size: {:7}/{:<7}   Created: {}\n",
        a.filename(),
        a.record_attributes().used_blocks(),
        a.allocated_blocks(),
        date(a.created(), 2),
    )
}

pub fn full(entry: &FileEntry) -> String {
    let a = &entry.attributes;
    let fid = a.fid();
    let (group, member) = owner(a);
    let ra = a.record_attributes();
    let [sys, own, grp, wld] = protection(a);

    let mut lines = vec![
        format!(
            "{}                  File ID:  ({},{},{})",
            a.filename(),
            word(&fid, 0),
            word(&fid, 1),
            i32::from(word(&fid, 2)) - 1,
        ),
        format!("Size: {:12}/{:<12}Owner: [{group:06o},{member:06o}]", ra.used_blocks(), a.allocated_blocks()),
        format!("Created:  {}", date(a.created(), 2)),
        format!("Revised:  {} ({})", date(a.revised(), 2), a.revision()),
        format!("Expires:  {}", date(a.expires(), 2)),
        format!("Backup:  {}", date(a.backed_up(), 2)),
        format!("File organization:  {}", organization(entry.record_flags)),
    ];
    let mut attrs = format!(
        "File attributes:    Allocation: {}, Extend: 0, Global Buffer Count: 0, Version limit: {}",
        a.allocated_blocks(),
        a.version_limit(),
    );
    if contiguous_best_try(a) {
        attrs.push_str(", Contiguous best try");
    }
    lines.push(attrs);
    lines.push(format!("  Record format:      {}", record_format_text(ra.format, ra.record_size)));
    lines.push(format!("  Record attributes:  {}", record_attributes_text(ra.attributes)));
    lines.push(format!("  File protection:    System:{sys}, Owner:{own}, Group:{grp}, World:{wld}"));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn csv(entry: &FileEntry) -> String {
    let a = &entry.attributes;
    let fid = a.fid();
    let (group, member) = owner(a);
    let ra = a.record_attributes();
    let [sys, own, grp, wld] = protection(a);

    let fields = [
        format!("\"{}\"", a.filename()),
        ra.used_blocks().to_string(),
        a.allocated_blocks().to_string(),
        format!("\"{}\"", date(a.created(), 7)),
        format!("{group:06o}"),
        format!("{member:06o}"),
        format!("\"{}\"", date(a.revised(), 7)),
        a.revision().to_string(),
        word(&fid, 0).to_string(),
        word(&fid, 1).to_string(),
        word(&fid, 2).to_string(),
        format!("\"{}\"", date(a.expires(), 7)),
        format!("\"{}\"", date(a.backed_up(), 7)),
        format!("\"{sys}\""),
        format!("\"{own}\""),
        format!("\"{grp}\""),
        format!("\"{wld}\""),
        organization(entry.record_flags).to_string(),
        a.allocated_blocks().to_string(),
        "0".to_string(),
        "0".to_string(),
        if contiguous_best_try(a) { "Contiguous best try".to_string() } else { String::new() },
        format!("\"{}\"", record_format_text(ra.format, ra.record_size)),
        format!("\"{}\"", record_attributes_text(ra.attributes)),
    ];
    let mut out = fields.join(",");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::AttributeTag;

    fn entry() -> FileEntry {
        let mut a = FileAttributes::default();
        a.insert(AttributeTag::Filename, b"[SYS]LOGIN.COM;2".to_vec());
        a.insert(AttributeTag::FileSize, 4u32.to_le_bytes().to_vec());
        a.insert(AttributeTag::Uic, [0o4u16, 0o200u16].iter().flat_map(|w| w.to_le_bytes()).collect());
        a.insert(AttributeTag::FPro, vec![0x00, 0xE8]);
        let mut recattr = vec![0u8; 32];
        recattr[0] = 2; // VAR
        recattr[1] = rattrib::CR;
        recattr[2..4].copy_from_slice(&80u16.to_le_bytes());
        recattr[10..12].copy_from_slice(&3u16.to_le_bytes());
        recattr[12..14].copy_from_slice(&10u16.to_le_bytes());
        a.insert(AttributeTag::RecAttr, recattr);
        FileEntry { attributes: a, record_flags: RecordFlags::default() }
    }

    #[test]
    fn protection_letters() {
        assert_eq!(protection_text(0x0), "RWED");
        assert_eq!(protection_text(0x8), "RWE");
        assert_eq!(protection_text(0xE), "R");
        assert_eq!(protection_text(0xF), "");
    }

    #[test]
    fn format_text() {
        assert_eq!(record_format_text(RecordFormat::Var, 80), "Variable length, maximum 80 bytes");
        assert_eq!(record_format_text(RecordFormat::Stm, 0), "Stream");
        assert_eq!(record_attributes_text(rattrib::CRN), "Carriage return carriage control");
        assert_eq!(record_attributes_text(9), "WARNING : Unknown attribute 9");
    }

    #[test]
    fn brief_layout() {
        let text = brief(&entry());
        assert_eq!(
            text,
            "[SYS]LOGIN.COM;2\n                      Size:       3/4         Created: <None Specified>\n"
        );
    }

    #[test]
    fn full_and_csv_carry_owner_and_protection() {
        let e = entry();
        let f = full(&e);
        assert!(f.contains("Owner: [000200,000004]"));
        assert!(f.contains("Record format:      Variable length, maximum 80 bytes"));
        assert!(f.contains("System:RWED, Owner:RWED, Group:RWE, World:R"));
        assert!(f.contains("File organization:  Sequential"));

        let c = csv(&e);
        assert!(c.starts_with("\"[SYS]LOGIN.COM;2\",3,4,\"<None Specified>\",000200,000004,"));
        assert!(c.ends_with("\"Variable length, maximum 80 bytes\",\"\"\n"));
        assert_eq!(render(&e, OutputType::Suppress), None);
    }
}
