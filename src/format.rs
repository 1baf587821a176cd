//! Human scaling for bit and byte counts. Units step by 1024 and stop at tera.

const KILO: f64 = 1024.0;

fn scale(value: f64, unit: &str) -> String {
    let prefixes = ["", "K", "M", "G"];
    for (i, p) in prefixes.iter().enumerate() {
        if value / KILO.powi(i as i32 + 1) < 1.0 {
            return format!("{:6.2} {}{}", value / KILO.powi(i as i32), p, unit);
        }
    }
    format!("{:6.2} T{}", value / KILO.powi(4), unit)
}

pub fn format_bits(bits: f64) -> String {
    scale(bits, "bits")
}

pub fn format_bytes(bytes: f64) -> String {
    scale(bytes, "bytes")
}
