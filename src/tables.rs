use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{core::Sample, quantity::power::Watts};

pub fn build_sample_table(sample: &Sample) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Phase", "Voltage", "Current", "Power", "Energy"]);

    let phases = ["L1", "L2", "L3"]
        .into_iter()
        .zip(sample.voltage.into_array())
        .zip(sample.current.into_array())
        .zip(sample.power.into_array())
        .zip(sample.energy.into_array());
    for ((((phase, voltage), current), power), energy) in phases {
        table.add_row(vec![
            Cell::new(phase).add_attribute(Attribute::Bold),
            Cell::new(voltage).set_alignment(CellAlignment::Right),
            Cell::new(current).set_alignment(CellAlignment::Right),
            Cell::new(power)
                .set_alignment(CellAlignment::Right)
                .fg(if power > Watts::ZERO { Color::Green } else { Color::Reset }),
            Cell::new(energy).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("Σ").add_attribute(Attribute::Bold),
        Cell::new(sample.frequency).set_alignment(CellAlignment::Right),
        Cell::new(""),
        Cell::new(sample.total_power).set_alignment(CellAlignment::Right),
        Cell::new(sample.timestamp.format("%b %d %H:%M:%S")).add_attribute(Attribute::Dim),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::Phases,
        quantity::{
            electric::{Amperes, Hertz, Volts},
            energy::KilowattHours,
            power::Kilowatts,
        },
    };

    #[test]
    fn sample_table_ok() {
        let sample = Sample::builder()
            .device_id("laadpaal_noord")
            .voltage(Phases::uniform(Volts(230.0)))
            .current(Phases::new(Amperes(16.0), Amperes::ZERO, Amperes::ZERO))
            .power(Phases::new(Watts(3680.0), Watts::ZERO, Watts::ZERO))
            .energy(Phases::uniform(KilowattHours(12.5)))
            .frequency(Hertz(50.0))
            .total_power(Kilowatts(3.68))
            .build();
        let rendered = build_sample_table(&sample).to_string();
        assert!(rendered.contains("230.0 V"));
        assert!(rendered.contains("3680.0 W"));
        assert!(rendered.contains("12.50 kWh"));
        assert!(rendered.contains("50.00 Hz"));
        assert!(rendered.contains("3.680 kW"));
    }
}
