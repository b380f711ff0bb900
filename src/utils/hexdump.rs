use std::cmp;
use std::fmt::Write;

/// Canonical hex display of `data`, sixteen bytes per line.
///
/// Each line shows the address (`base` + position in `data`), sixteen space-separated two
/// column hex bytes, and the same bytes with control characters replaced by dots.
pub fn hexdump(data: &[u8], base: usize) -> String {
    let mut out = String::new();

    for (i, line) in data.chunks(16).enumerate() {
        let address = base + i * 16;
        let _ = write!(out, "{:08x}:", address);

        for b in line {
            let _ = write!(out, " {:02x}", b);
        }

        // align the ascii column of a short last line
        for _ in line.len()..16 {
            out.push_str("   ");
        }

        out.push_str("  ");
        for c in line {
            let c = *c as char;
            if c.is_ascii_graphic() || c == ' ' {
                out.push(c);
            } else {
                out.push('.');
            }
        }
        out.push('\n');
    }

    out
}

/// Dumps up to `radius` bytes before and after `offset`, aligned down to a 16 byte line.
///
/// Used to show the neighbourhood of a decoding error in debug logs.
pub fn dump_around(data: &[u8], offset: usize, radius: usize) -> String {
    let offset = cmp::min(offset, data.len());
    let start = offset.saturating_sub(radius) & !0xf;
    let end = cmp::min(offset.saturating_add(radius), data.len());

    hexdump(&data[start..end], start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump_single_line() {
        let dump = hexdump(b"cpus\0\0\0\x01", 0x38);
        assert_eq!(
            dump,
            "00000038: 63 70 75 73 00 00 00 01                          cpus....\n"
        );
    }

    #[test]
    fn test_dump_around_clamps_to_buffer() {
        let data = [0xffu8; 40];
        let dump = dump_around(&data, 38, 8);
        assert!(dump.starts_with("00000010:"));
        assert_eq!(dump.lines().count(), 2);

        assert_eq!(dump_around(&data, 1000, 8).lines().count(), 1);
    }
}
