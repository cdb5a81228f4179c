// tests/test_color_roundtrip.rs
// Lab and HCL conversions return the starting color within one 8-bit step
//
// RELEVANT FILES: src/style/color.rs

#[cfg(test)]
mod color_roundtrip_tests {
    use mapstyle::style::Color;

    const TOLERANCE: f64 = 1.0 / 255.0;

    /// Deterministic linear congruential sequence in 0..1.
    struct Lcg(u64);

    impl Lcg {
        fn next_unit(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn colors(count: usize) -> Vec<Color> {
        let mut rng = Lcg(0x5eed);
        (0..count)
            .map(|_| Color::new(rng.next_unit(), rng.next_unit(), rng.next_unit(), 1.0))
            .collect()
    }

    fn assert_close(original: &Color, converted: &Color, space: &str) {
        let a = original.to_straight();
        let b = converted.to_straight();
        for channel in 0..4 {
            assert!(
                (a[channel] - b[channel]).abs() <= TOLERANCE,
                "{space} round trip drifted: {a:?} -> {b:?}"
            );
        }
    }

    #[test]
    fn lab_round_trip() {
        for color in colors(1000) {
            assert_close(&color, &Color::from_lab(color.to_lab()), "lab");
        }
    }

    #[test]
    fn hcl_round_trip() {
        for color in colors(1000) {
            assert_close(&color, &Color::from_hcl(color.to_hcl()), "hcl");
        }
    }

    #[test]
    fn grays_have_no_hue() {
        for level in [0.0, 0.25, 0.5, 1.0] {
            let gray = Color::new(level, level, level, 1.0);
            let hcl = gray.to_hcl();
            assert!(hcl.h.is_nan());
            assert_close(&gray, &Color::from_hcl(hcl), "gray hcl");
        }
    }

    #[test]
    fn alpha_survives_conversion() {
        let color = Color::new(0.2, 0.6, 0.9, 0.5);
        assert_close(&color, &Color::from_lab(color.to_lab()), "translucent lab");
    }
}
