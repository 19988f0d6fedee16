//! Field-level codecs. Every on-wire field uses one of these encodings:
//! UTF-8 (8 bits per character), binary flags (1 bit), hexadecimal nibbles
//! (4 bits), BCD decimal digits (4 bits), and the compound datetime,
//! duration, latitude and longitude formats that strip their separators
//! before BCD packing.

use super::{
    bits::{BitReader, BitWriter},
    CodecError,
};

pub fn write_utf8(w: &mut BitWriter, field: &'static str, value: &str) -> Result<(), CodecError> {
    for c in value.chars() {
        let cp = u32::from(c);
        if cp > 0x7f {
            return Err(CodecError::InvalidChar {
                field,
                character: c,
            });
        }
        w.push_bits(cp as u8, 8);
    }
    Ok(())
}

/// Reads 8-bit characters until fewer than 8 bits remain (the remainder is
/// the zero pad of the final byte).
pub fn read_utf8_to_end(r: &mut BitReader<'_>) -> Result<String, CodecError> {
    let mut out = String::new();
    while r.remaining() >= 8 {
        out.push(char::from(r.read_bits(8)?));
    }
    Ok(out)
}

pub fn read_utf8_char(r: &mut BitReader<'_>) -> Result<char, CodecError> {
    Ok(char::from(r.read_bits(8)?))
}

pub fn write_bin(w: &mut BitWriter, field: &'static str, value: &str) -> Result<(), CodecError> {
    for c in value.chars() {
        match c {
            '0' => w.push_bit(false),
            '1' => w.push_bit(true),
            _ => {
                return Err(CodecError::InvalidChar {
                    field,
                    character: c,
                })
            }
        }
    }
    Ok(())
}

pub fn read_bin(r: &mut BitReader<'_>, bits: usize) -> Result<String, CodecError> {
    let mut out = String::with_capacity(bits);
    for _ in 0..bits {
        out.push(if r.read_bits(1)? == 1 { '1' } else { '0' });
    }
    Ok(out)
}

pub fn write_hex(w: &mut BitWriter, field: &'static str, value: &str) -> Result<(), CodecError> {
    for c in value.chars() {
        let nibble = c.to_digit(16).ok_or(CodecError::InvalidChar {
            field,
            character: c,
        })?;
        w.push_bits(nibble as u8, 4);
    }
    Ok(())
}

pub fn read_hex(r: &mut BitReader<'_>, nibbles: usize) -> Result<String, CodecError> {
    let mut out = String::with_capacity(nibbles);
    for _ in 0..nibbles {
        let nibble = r.read_bits(4)?;
        out.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
    }
    Ok(out)
}

/// Reads hex nibbles until fewer than 4 bits remain. A 4-bit-or-wider zero
/// pad therefore yields a trailing `0` nibble; callers that need byte
/// alignment handle that at the schema level.
pub fn read_hex_to_end(r: &mut BitReader<'_>) -> Result<String, CodecError> {
    let mut out = String::new();
    while r.remaining() >= 4 {
        let nibble = r.read_bits(4)?;
        out.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
    }
    Ok(out)
}

pub fn write_dec(w: &mut BitWriter, field: &'static str, value: &str) -> Result<(), CodecError> {
    for c in value.chars() {
        let digit = c.to_digit(10).ok_or(CodecError::InvalidChar {
            field,
            character: c,
        })?;
        w.push_bits(digit as u8, 4);
    }
    Ok(())
}

pub fn read_dec(r: &mut BitReader<'_>, digits: usize) -> Result<String, CodecError> {
    let mut out = String::with_capacity(digits);
    for _ in 0..digits {
        let digit = r.read_bits(4)?;
        if digit > 9 {
            return Err(CodecError::InvalidBcdDigit(digit));
        }
        out.push(char::from_digit(u32::from(digit), 10).unwrap_or('0'));
    }
    Ok(out)
}

fn strip_formatting(
    field: &'static str,
    value: &str,
    separators: &[char],
    digits: usize,
) -> Result<String, CodecError> {
    let stripped: String = value.chars().filter(|c| !separators.contains(c)).collect();
    if stripped.len() != digits || !stripped.chars().all(|c| c.is_ascii_digit()) {
        return Err(CodecError::InvalidField {
            field,
            reason: format!("expected {digits} digits, got {value:?}"),
        });
    }
    Ok(stripped)
}

/// `YYYY-MM-DDThh:mm:ssZ` packed as 14 BCD digits (56 bits).
pub fn write_datetime(w: &mut BitWriter, value: &str) -> Result<(), CodecError> {
    let digits = strip_formatting("DateTime", value, &['-', ':', 'T', 'Z'], 14)?;
    write_dec(w, "DateTime", &digits)
}

pub fn read_datetime(r: &mut BitReader<'_>) -> Result<String, CodecError> {
    let d = read_dec(r, 14)?;
    Ok(format!(
        "{}-{}-{}T{}:{}:{}Z",
        &d[0..4],
        &d[4..6],
        &d[6..8],
        &d[8..10],
        &d[10..12],
        &d[12..14]
    ))
}

/// `PnnDnnHnnM` packed as 6 BCD digits (24 bits).
pub fn write_duration(w: &mut BitWriter, value: &str) -> Result<(), CodecError> {
    let digits = strip_formatting("Duration", value, &['P', 'D', 'H', 'M'], 6)?;
    write_dec(w, "Duration", &digits)
}

pub fn read_duration(r: &mut BitReader<'_>) -> Result<String, CodecError> {
    let d = read_dec(r, 6)?;
    Ok(format!("P{}D{}H{}M", &d[0..2], &d[2..4], &d[4..6]))
}

fn write_coordinate(
    w: &mut BitWriter,
    field: &'static str,
    value: &str,
    digits: usize,
) -> Result<(), CodecError> {
    let mut chars = value.chars();
    let sign = match chars.next() {
        Some('+') => true,
        Some('-') => false,
        _ => {
            return Err(CodecError::InvalidField {
                field,
                reason: format!("missing sign in {value:?}"),
            })
        }
    };
    w.push_bit(sign);
    let body: String = chars.collect();
    let stripped = strip_formatting(field, &body, &['.'], digits)?;
    write_dec(w, field, &stripped)
}

fn read_coordinate(
    r: &mut BitReader<'_>,
    digits: usize,
    integer_digits: usize,
) -> Result<String, CodecError> {
    let sign = if r.read_bits(1)? == 1 { '+' } else { '-' };
    let d = read_dec(r, digits)?;
    Ok(format!(
        "{sign}{}.{}",
        &d[..integer_digits],
        &d[integer_digits..]
    ))
}

/// Latitude `±DD.DDDDD`: sign bit plus 7 BCD digits (29 bits).
pub fn write_latitude(w: &mut BitWriter, value: &str) -> Result<(), CodecError> {
    write_coordinate(w, "ObjectLatitude", value, 7)
}

pub fn read_latitude(r: &mut BitReader<'_>) -> Result<String, CodecError> {
    read_coordinate(r, 7, 2)
}

/// Longitude `±DDD.DDDDD`: sign bit plus 8 BCD digits (33 bits).
pub fn write_longitude(w: &mut BitWriter, value: &str) -> Result<(), CodecError> {
    write_coordinate(w, "ObjectLongitude", value, 8)
}

pub fn read_longitude(r: &mut BitReader<'_>) -> Result<String, CodecError> {
    read_coordinate(r, 8, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<W, R>(write: W, read: R, value: &str)
    where
        W: FnOnce(&mut BitWriter) -> Result<(), CodecError>,
        R: FnOnce(&mut BitReader<'_>) -> Result<String, CodecError>,
    {
        let mut w = BitWriter::new();
        write(&mut w).unwrap();
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert_eq!(read(&mut r).unwrap(), value);
    }

    #[test]
    fn datetime_round_trip() {
        round_trip(
            |w| write_datetime(w, "2020-07-01T12:34:56Z"),
            read_datetime,
            "2020-07-01T12:34:56Z",
        );
    }

    #[test]
    fn duration_round_trip() {
        round_trip(
            |w| write_duration(w, "P00D01H30M"),
            read_duration,
            "P00D01H30M",
        );
    }

    #[test]
    fn latitude_round_trip() {
        round_trip(
            |w| write_latitude(w, "+39.09350"),
            read_latitude,
            "+39.09350",
        );
        round_trip(
            |w| write_latitude(w, "-01.00000"),
            read_latitude,
            "-01.00000",
        );
    }

    #[test]
    fn longitude_round_trip() {
        round_trip(
            |w| write_longitude(w, "-122.34500"),
            read_longitude,
            "-122.34500",
        );
    }

    #[test]
    fn latitude_occupies_29_bits() {
        let mut w = BitWriter::new();
        write_latitude(&mut w, "+39.09350").unwrap();
        assert_eq!(w.bit_len(), 29);
    }

    #[test]
    fn longitude_occupies_33_bits() {
        let mut w = BitWriter::new();
        write_longitude(&mut w, "-122.34500").unwrap();
        assert_eq!(w.bit_len(), 33);
    }

    #[test]
    fn rejects_non_digit_bcd() {
        let mut w = BitWriter::new();
        assert!(write_dec(&mut w, "ObjectSizeDim1", "01a0").is_err());
    }

    #[test]
    fn rejects_coordinate_without_sign() {
        let mut w = BitWriter::new();
        assert!(write_latitude(&mut w, "39.09350").is_err());
    }
}
