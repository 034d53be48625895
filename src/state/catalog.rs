// src/state/catalog.rs
//
// Built-in presets, for hosts that do not ship their own catalog.

use super::{EnvelopeBreakpoint as Bp, PhaseBoundaries, Preset};

pub fn builtin_presets() -> Vec<Preset> {
    vec![
        Preset::new(
            "deep-sleep",
            "Deep Sleep",
            100.0,
            vec![
                Bp::new(10.0, 120.0),
                Bp::new(6.0, 300.0),
                Bp::new(3.0, 900.0),
                Bp::new(1.5, 480.0),
            ],
        )
        .with_color("#3b4cca")
        .with_target_band("Delta")
        .with_phases(PhaseBoundaries::seconds(120.0, 180.0)),
        Preset::new(
            "meditation",
            "Meditation",
            200.0,
            vec![
                Bp::new(10.0, 120.0),
                Bp::new(7.0, 600.0),
                Bp::new(6.0, 300.0),
                Bp::new(9.0, 180.0),
            ],
        )
        .with_color("#7b5ea7")
        .with_target_band("Theta"),
        Preset::new(
            "calm-focus",
            "Calm Focus",
            220.0,
            vec![Bp::new(12.0, 60.0), Bp::new(10.0, 720.0), Bp::new(12.0, 120.0)],
        )
        .with_color("#2a9d8f")
        .with_target_band("Alpha")
        .with_phases(PhaseBoundaries::seconds(60.0, 60.0)),
        Preset::new(
            "energize",
            "Energize",
            250.0,
            vec![
                Bp::new(10.0, 60.0).with_carrier(240.0),
                Bp::new(18.0, 480.0),
                Bp::new(14.0, 60.0),
            ],
        )
        .with_color("#e76f51")
        .with_target_band("Beta"),
    ]
}

/// Look up a built-in preset by id.
pub fn builtin_preset(id: &str) -> Option<Preset> {
    builtin_presets().into_iter().find(|p| p.id == id)
}
