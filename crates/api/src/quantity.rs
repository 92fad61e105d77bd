//! Minimal resource-quantity arithmetic for node capacity annotations.
//!
//! Quantities are held in milli-units so that CPU (`250m`) and memory (`512Mi`) share one
//! integer representation.

use std::fmt;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Milli(pub i128);

impl Milli {
    /// Parse `<number><suffix>`; unknown suffixes or malformed numbers read as zero.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-')).unwrap_or(s.len());
        let (num, suffix) = s.split_at(split);
        let Some((mantissa, frac_digits)) = parse_decimal(num) else { return Milli(0) };
        let (exp10, bin): (i32, u32) = match suffix {
            "" => (0, 0),
            "n" => (-9, 0),
            "u" => (-6, 0),
            "m" => (-3, 0),
            "k" => (3, 0),
            "M" => (6, 0),
            "G" => (9, 0),
            "T" => (12, 0),
            "P" => (15, 0),
            "E" => (18, 0),
            "Ki" => (0, 1),
            "Mi" => (0, 2),
            "Gi" => (0, 3),
            "Ti" => (0, 4),
            "Pi" => (0, 5),
            "Ei" => (0, 6),
            exp if exp.starts_with(['e', 'E']) => match exp[1..].parse::<i32>() {
                Ok(e) => (e, 0),
                Err(_) => return Milli(0),
            },
            _ => return Milli(0),
        };
        scale(mantissa, 3 + exp10 - frac_digits as i32, bin).map(Milli).unwrap_or_default()
    }

    pub fn from_quantity(q: Option<&Quantity>) -> Self { q.map(|q| Self::parse(&q.0)).unwrap_or_default() }

    /// `self / of` as a whole percentage, truncated. Zero when `of` is zero.
    pub fn percent_of(self, of: Milli) -> i64 {
        if of.0 == 0 {
            return 0;
        }
        (self.0 as f64 / of.0 as f64 * 100.0) as i64
    }

    /// Rendered as a CPU amount: whole cores when exact, else millicores.
    pub fn cpu(self) -> CpuDisplay { CpuDisplay(self) }

    /// Rendered as a byte amount with the largest exact binary suffix.
    pub fn bytes(self) -> BytesDisplay { BytesDisplay(self) }
}

// "12.50" -> (1250, 2)
fn parse_decimal(num: &str) -> Option<(i128, u32)> {
    let (int, frac) = num.split_once('.').unwrap_or((num, ""));
    if int.trim_start_matches(['+', '-']).is_empty() && frac.is_empty() {
        return None;
    }
    let mantissa = format!("{int}{frac}").parse::<i128>().ok()?;
    Some((mantissa, frac.len() as u32))
}

// mantissa * 1024^bin * 10^pow10, rounded up when pow10 is negative
fn scale(mantissa: i128, pow10: i32, bin: u32) -> Option<i128> {
    let n = mantissa.checked_mul(1024i128.checked_pow(bin)?)?;
    if pow10 >= 0 {
        n.checked_mul(10i128.checked_pow(pow10 as u32)?)
    } else {
        let d = 10i128.checked_pow(pow10.unsigned_abs())?;
        Some(if n > 0 { n.saturating_add(d - 1) / d } else { n / d })
    }
}

impl std::ops::Add for Milli {
    type Output = Milli;
    fn add(self, rhs: Milli) -> Milli { Milli(self.0.saturating_add(rhs.0)) }
}

pub struct CpuDisplay(Milli);

impl fmt::Display for CpuDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0 .0;
        if m % 1000 == 0 { write!(f, "{}", m / 1000) } else { write!(f, "{m}m") }
    }
}

pub struct BytesDisplay(Milli);

impl fmt::Display for BytesDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0 .0.saturating_add(999) / 1000;
        if bytes == 0 {
            return f.write_str("0");
        }
        for (suffix, pow) in [("Ei", 6u32), ("Pi", 5), ("Ti", 4), ("Gi", 3), ("Mi", 2), ("Ki", 1)] {
            let unit = 1024i128.pow(pow);
            if bytes % unit == 0 {
                return write!(f, "{}{}", bytes / unit, suffix);
            }
        }
        write!(f, "{bytes}")
    }
}
