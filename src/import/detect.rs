//! File-kind, delimiter and encoding detection for CSV imports.
//!
//! Exports arrive from three different tools with no manifest. Detection goes
//! filename hint first (cheap, usually right), then header signature. Neither
//! match is an error at this level; the caller raises `UnknownFileType`.

use std::path::Path;

/// Semantic type of an import file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Activity/intervention log ("Durata", "Iniziata il" columns).
    Activity,
    /// Clock-in/clock-out punches ("ora_inizio", "ora_fine").
    TimeClock,
    /// Remote-support session export ("durata_minuti").
    RemoteSession,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Activity => "activity",
            FileKind::TimeClock => "time_clock",
            FileKind::RemoteSession => "remote_session",
        }
    }
}

/// Guess the kind from the filename alone. Used before the file is opened so
/// a drop directory can be triaged cheaply.
pub fn kind_from_filename(path: &Path) -> Option<FileKind> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.contains("attivita") || name.contains("activity") || name.contains("interventi") {
        Some(FileKind::Activity)
    } else if name.contains("timbrature") || name.contains("clock") || name.contains("presenze") {
        Some(FileKind::TimeClock)
    } else if name.contains("teamviewer") || name.contains("session") || name.contains("connessioni")
    {
        Some(FileKind::RemoteSession)
    } else {
        None
    }
}

/// Guess the kind from the header row. Signature columns are checked
/// case-insensitively; the session signature is checked first because its
/// "durata_minuti" would otherwise shadow the activity "durata".
pub fn kind_from_header(header: &[String]) -> Option<FileKind> {
    let lower: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
    let has = |needle: &str| lower.iter().any(|h| h == needle);

    if has("durata_minuti") {
        return Some(FileKind::RemoteSession);
    }
    if has("ora_inizio") && has("ora_fine") {
        return Some(FileKind::TimeClock);
    }
    if has("durata") || has("iniziata il") {
        return Some(FileKind::Activity);
    }
    None
}

/// Sniff the field separator from the header line: whichever of `;` and `,`
/// occurs more often wins, `;` on ties (the dominant export format).
pub fn sniff_delimiter(header_line: &str) -> u8 {
    let semis = header_line.matches(';').count();
    let commas = header_line.matches(',').count();
    if commas > semis {
        b','
    } else {
        b';'
    }
}

/// Decode raw file bytes: UTF-8 when valid, otherwise Latin-1.
///
/// Exports from the legacy tools are Latin-1; every Latin-1 byte maps 1:1 to
/// the Unicode code point of the same value, so the fallback is a direct
/// widening. No external detection pass is needed because any byte sequence
/// is valid Latin-1.
pub fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_filename_hints() {
        let cases = [
            ("export_attivita_gennaio.csv", Some(FileKind::Activity)),
            ("timbrature_2026.csv", Some(FileKind::TimeClock)),
            ("TeamViewer_Connections.csv", Some(FileKind::RemoteSession)),
            ("misc.csv", None),
        ];
        for (name, expected) in cases {
            assert_eq!(kind_from_filename(&PathBuf::from(name)), expected, "{name}");
        }
    }

    #[test]
    fn test_header_signatures() {
        assert_eq!(
            kind_from_header(&header(&["Operatore", "Iniziata il", "Durata", "Descrizione"])),
            Some(FileKind::Activity)
        );
        assert_eq!(
            kind_from_header(&header(&["dipendente", "data", "ora_inizio", "ora_fine"])),
            Some(FileKind::TimeClock)
        );
        assert_eq!(
            kind_from_header(&header(&["utente", "inizio", "durata_minuti", "computer"])),
            Some(FileKind::RemoteSession)
        );
        assert_eq!(kind_from_header(&header(&["a", "b", "c"])), None);
    }

    #[test]
    fn test_session_signature_wins_over_activity() {
        // "durata_minuti" present alongside a generic "durata" must mean session
        let h = header(&["utente", "durata", "durata_minuti"]);
        assert_eq!(kind_from_header(&h), Some(FileKind::RemoteSession));
    }

    #[test]
    fn test_delimiter_sniff() {
        assert_eq!(sniff_delimiter("a;b;c"), b';');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        // Italian decimal comma inside a quoted field must not flip the winner
        assert_eq!(sniff_delimiter("Operatore;Durata;\"Note, varie\""), b';');
        assert_eq!(sniff_delimiter("plain"), b';');
    }

    #[test]
    fn test_decode_utf8_and_latin1() {
        assert_eq!(decode_bytes("già".as_bytes()), "già");
        // 0xE0 is à in Latin-1 and invalid as a lone UTF-8 byte
        assert_eq!(decode_bytes(&[b'g', b'i', 0xE0]), "già");
    }
}
