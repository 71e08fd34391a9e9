//! Behavioral tests for the schedulers.

use super::*;

const EPS: f64 = 1e-10;

mod constant_lr_tests {
    use super::*;

    #[test]
    fn should_return_same_lr_for_any_step() {
        let sched = ConstantLR::new(0.001);
        assert_eq!(sched.get_lr(0), 0.001);
        assert_eq!(sched.get_lr(usize::MAX), 0.001);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "non-negative"))]
    fn should_reject_negative_lr() {
        let sched = ConstantLR::new(-0.001);
        assert_eq!(sched.get_lr(0), 0.0);
    }
}

mod linear_decay_tests {
    use super::*;

    #[test]
    fn should_interpolate_and_clamp() {
        let sched = LinearDecay::new(1.0, 0.0, 100);
        assert!((sched.get_lr(0) - 1.0).abs() < EPS);
        assert!((sched.get_lr(50) - 0.5).abs() < EPS);
        assert!(sched.get_lr(100).abs() < EPS);
        assert!(sched.get_lr(200).abs() < EPS);
    }

    #[test]
    fn should_support_increasing_schedules() {
        let sched = LinearDecay::new(0.0, 1.0, 4);
        assert!((sched.get_lr(1) - 0.25).abs() < EPS);
    }
}

mod polynomial_decay_tests {
    use super::*;

    #[test]
    fn power_one_is_linear() {
        let sched = PolynomialDecay::new(0.2, 0.0, 10, 1.0);
        assert!((sched.get_lr(0) - 0.2).abs() < EPS);
        assert!((sched.get_lr(5) - 0.1).abs() < EPS);
        assert!(sched.get_lr(10).abs() < EPS);
        assert!(sched.get_lr(11).abs() < EPS);
    }

    #[test]
    fn power_two_decays_faster_early() {
        let sched = PolynomialDecay::new(1.0, 0.0, 10, 2.0);
        assert!((sched.get_lr(5) - 0.25).abs() < EPS);
    }

    #[test]
    fn equal_endpoints_are_constant() {
        let sched = PolynomialDecay::new(0.5, 0.5, 10, 1.0);
        assert_eq!(sched.get_lr(3), 0.5);
    }
}

mod annealed_tests {
    use super::*;

    #[test]
    fn off_is_constant() {
        let sched = annealed(0.01, false, 10);
        assert_eq!(sched.get_lr(9), 0.01);
    }

    #[test]
    fn on_reaches_zero_at_the_end() {
        let sched = annealed(0.01, true, 10);
        assert!((sched.get_lr(0) - 0.01).abs() < EPS);
        assert!(sched.get_lr(10).abs() < EPS);
    }
}
