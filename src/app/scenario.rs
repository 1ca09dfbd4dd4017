//! Preset scenarios: one table row per lab dataset.

use std::path::Path;

use crate::domain::{ColumnLayout, FitDomain, FitPath, PlotColor, Scenario};

/// Built-in datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Calibration,
    Silicon,
    Germanium,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Calibration, Preset::Silicon, Preset::Germanium];

    /// Build the scenario, resolving its file under `data_dir`.
    ///
    /// `diode_path` applies to the diode presets only; calibration is always linear.
    pub fn scenario(self, data_dir: &Path, diode_path: FitPath) -> Scenario {
        let (id, title, file, marker) = match self {
            Preset::Calibration => ("calibration", "Calibrazione", "dati_calibrazione.txt", PlotColor::Blue),
            Preset::Silicon => ("silicon", "Diodo Silicio", "dati_silicio.txt", PlotColor::Blue),
            Preset::Germanium => ("germanium", "Diodo Germanio", "dati_germanio.txt", PlotColor::Green),
        };

        let (layout, path, x_label, y_label) = match self {
            Preset::Calibration => (
                ColumnLayout::Calibration,
                FitPath::Linear,
                "Multimetro (mV)",
                "Oscilloscopio (mV)",
            ),
            Preset::Silicon | Preset::Germanium => {
                let y_label = if diode_path == FitPath::LogLinear {
                    "ln Corrente (mA)"
                } else {
                    "Corrente (mA)"
                };
                (ColumnLayout::Raw, diode_path, "Tensione (mV)", y_label)
            }
        };

        Scenario {
            id: id.to_string(),
            title: title.to_string(),
            file: data_dir.join(file),
            layout,
            path,
            domain: FitDomain::new(0.0, 1000.0),
            initial_guess: None,
            marker,
            line: PlotColor::Red,
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_follow_the_lab_table() {
        let dir = Path::new("/data");
        let s: Vec<Scenario> = Preset::ALL.iter().map(|p| p.scenario(dir, FitPath::LogLinear)).collect();

        assert_eq!(s[0].file, dir.join("dati_calibrazione.txt"));
        assert_eq!(s[0].layout, ColumnLayout::Calibration);
        assert_eq!(s[0].path, FitPath::Linear);
        assert_eq!(s[0].x_label, "Multimetro (mV)");

        assert_eq!(s[1].path, FitPath::LogLinear);
        assert_eq!(s[1].marker, PlotColor::Blue);
        assert_eq!(s[2].marker, PlotColor::Green);
        assert_eq!(s[2].file, dir.join("dati_germanio.txt"));

        for scenario in &s {
            assert_eq!(scenario.domain, FitDomain::new(0.0, 1000.0));
        }
    }

    #[test]
    fn exponential_switches_only_diodes() {
        let dir = Path::new(".");
        assert_eq!(Preset::Calibration.scenario(dir, FitPath::Exponential).path, FitPath::Linear);
        let si = Preset::Silicon.scenario(dir, FitPath::Exponential);
        assert_eq!(si.path, FitPath::Exponential);
        assert_eq!(si.y_label, "Corrente (mA)");
    }
}
