/// Column role classification.
///
/// Validation, persistence, and metrics never address cells by fixed struct
/// fields; they look cells up by semantic role. Role resolution happens here,
/// once per worksheet, by pattern-matching canonical keys and labels. All
/// matches are case-insensitive and leftmost-wins.
use crate::ingest::CanonicalColumn;

/// Resolved column keys for one worksheet. `None` means the worksheet has no
/// column filling that role.
#[derive(Debug, Clone, Default)]
pub struct ColumnRoles {
    pub name: Option<String>,
    pub nik: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    /// Physical index of the address column, for the columns-to-its-right
    /// presence-flag transform.
    pub address_index: Option<usize>,
    pub skrining: Option<String>,
    pub pengobatan: Option<String>,
    pub penyuluhan: Option<String>,
    pub pemberdayaan: Option<String>,
    pub kemandirian_a: Option<String>,
    pub kemandirian_b: Option<String>,
    pub kemandirian_c: Option<String>,
    /// Every date-shaped column, for date validation and commit-time
    /// serial conversion. Includes the birth-date column.
    pub date_keys: Vec<String>,
}

impl ColumnRoles {
    /// The four service flags behind the "served" aggregate.
    pub fn service_flags(&self) -> [Option<&str>; 4] {
        [
            self.skrining.as_deref(),
            self.pengobatan.as_deref(),
            self.penyuluhan.as_deref(),
            self.pemberdayaan.as_deref(),
        ]
    }

    pub fn is_date_key(&self, key: &str) -> bool {
        self.date_keys.iter().any(|k| k == key)
    }
}

/// Classify a worksheet's columns into roles.
pub fn classify_columns(columns: &[CanonicalColumn]) -> ColumnRoles {
    let mut roles = ColumnRoles {
        name: exact_or_contains(columns, "nama"),
        nik: exact_or_contains(columns, "nik"),
        age: exact_or_contains(columns, "umur"),
        gender: find_gender(columns),
        birth_date: find_key(columns, |k, _| k.contains("lahir")),
        address: find_key(columns, |k, _| k == "alamat"),
        ..ColumnRoles::default()
    };

    roles.address_index = roles.address.as_deref().and_then(|key| {
        columns
            .iter()
            .find(|c| c.key.eq_ignore_ascii_case(key))
            .map(|c| c.index)
    });

    roles.skrining = find_key(columns, |k, l| {
        k.contains("skrining") || l.contains("skrining")
    });
    roles.pengobatan = find_key(columns, |k, _| k.contains("obat"));
    roles.penyuluhan = find_key(columns, |k, _| {
        k.contains("penyuluhan") || k.contains("konseling")
    });
    roles.pemberdayaan = find_key(columns, |k, _| {
        k.contains("pemberdayaan") || k.contains("berdaya")
    });

    roles.kemandirian_a = find_tier(columns, "a");
    roles.kemandirian_b = find_tier(columns, "b");
    roles.kemandirian_c = find_tier(columns, "c");

    roles.date_keys = columns
        .iter()
        .filter(|c| {
            let k = c.key.to_lowercase();
            k.contains("tanggal") || k.contains("tgl") || k.contains("date") || k.contains("lahir")
        })
        .map(|c| c.key.clone())
        .collect();

    roles
}

/// Leftmost column whose lowercased key/label satisfies the predicate.
fn find_key<F>(columns: &[CanonicalColumn], matches: F) -> Option<String>
where
    F: Fn(&str, &str) -> bool,
{
    columns
        .iter()
        .find(|c| matches(&c.key.to_lowercase(), &c.label.to_lowercase()))
        .map(|c| c.key.clone())
}

/// Leftmost exact key match, falling back to leftmost substring match.
fn exact_or_contains(columns: &[CanonicalColumn], token: &str) -> Option<String> {
    find_key(columns, |k, _| k == token).or_else(|| find_key(columns, |k, _| k.contains(token)))
}

fn find_gender(columns: &[CanonicalColumn]) -> Option<String> {
    find_key(columns, |k, l| {
        k == "jk" || k.contains("jenis_kelamin") || (l.contains("jenis") && l.contains("kelamin"))
    })
}

fn find_tier(columns: &[CanonicalColumn], tier: &str) -> Option<String> {
    let suffix = format!("_{tier}");
    find_key(columns, |k, _| {
        k.contains("kemandirian") && k.ends_with(&suffix)
    })
}
