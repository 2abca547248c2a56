quantity!(Amperes, "A", 1);
quantity!(Volts, "V", 1);
quantity!(Hertz, "Hz", 2);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_ok() {
        assert_eq!(Amperes(15.96).to_string(), "16.0 A");
        assert_eq!(Volts(230.04).to_string(), "230.0 V");
        assert_eq!(Hertz(49.987).to_string(), "49.99 Hz");
    }

    #[test]
    fn nan_equals_itself() {
        assert_eq!(Volts(f64::NAN), Volts(f64::NAN));
        assert_ne!(Volts(f64::NAN), Volts(230.0));
    }
}
