use base64::Engine;

pub fn format_bytes(bytesval: usize, precision: usize) -> String {
    let mut val = bytesval as f32;

    for unit in ["bytes", "KiB", "MiB", "GiB", "TiB"] {
        if val < 1024.0 {
            return format!("{:.precision$} {}", val, unit, precision = precision);
        }

        val /= 1024.0;
    }

    format!("{:.precision$} PiB", val, precision = precision)
}

pub(crate) fn decode_base64<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_units() {
        assert_eq!(format_bytes(512, 0), "512 bytes");
        assert_eq!(format_bytes(1536, 1), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024, 2), "5.00 MiB");
    }
}
