//! Loading, saving and unit normalization of body datasets.
//!
//! Datasets are row-oriented CSV with one body per row. The algorithms
//! never see these records; they are decomposed into
//! [`SimulationState`](crate::state::SimulationState) arrays first.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::math::{PARSEC_IN_KM, Real, SOLAR_MASS_IN_KG, Vec3, YEAR_IN_SECONDS};

const EXPECTED_HEADER: [&str; 10] = [
    "id", "name", "class", "mass", "pos_x", "pos_y", "pos_z", "vel_x", "vel_y", "vel_z",
];

/// One row of a dataset file. Field order matches the on-disk schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    pub id: String,
    pub name: String,
    pub class: String,
    pub mass: Real,
    pub pos_x: Real,
    pub pos_y: Real,
    pub pos_z: Real,
    pub vel_x: Real,
    pub vel_y: Real,
    pub vel_z: Real,
}

impl BodyRecord {
    pub fn new(id: &str, name: &str, class: &str, mass: Real, position: Vec3, velocity: Vec3) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            class: class.to_owned(),
            mass,
            pos_x: position.x,
            pos_y: position.y,
            pos_z: position.z,
            vel_x: velocity.x,
            vel_y: velocity.y,
            vel_z: velocity.z,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.pos_x, self.pos_y, self.pos_z)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.pos_x = position.x;
        self.pos_y = position.y;
        self.pos_z = position.z;
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::new(self.vel_x, self.vel_y, self.vel_z)
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.vel_x = velocity.x;
        self.vel_y = velocity.y;
        self.vel_z = velocity.z;
    }
}

pub fn load_csv<R: Read>(reader: R) -> Result<Vec<BodyRecord>, SimError> {
    let mut reader = csv::Reader::from_reader(reader);

    let headers = reader.headers()?;
    if !headers.iter().eq(EXPECTED_HEADER) {
        return Err(SimError::MalformedInput(format!(
            "unexpected header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut bodies = Vec::new();
    for record in reader.deserialize() {
        bodies.push(record?);
    }
    Ok(bodies)
}

pub fn load_csv_file<P: AsRef<Path>>(path: P) -> Result<Vec<BodyRecord>, SimError> {
    let bodies = load_csv(File::open(path.as_ref())?)?;
    info!("loaded {} bodies from {}", bodies.len(), path.as_ref().display());
    Ok(bodies)
}

/// Write records with the standard header. Float formatting round-trips
/// full double precision.
pub fn save_csv<W: Write>(writer: W, records: &[BodyRecord]) -> Result<(), SimError> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_csv_file<P: AsRef<Path>>(path: P, records: &[BodyRecord]) -> Result<(), SimError> {
    save_csv(File::create(path)?, records)
}

/// Unit policy for datasets measured in kg, parsec and parsec/year.
/// Normalization converts into the internal units (solar mass, km, km/s);
/// denormalization inverts it exactly.
pub struct ParsecYearDataset;

impl ParsecYearDataset {
    pub fn normalize(record: &mut BodyRecord) {
        record.mass /= SOLAR_MASS_IN_KG;
        record.set_position(record.position() * PARSEC_IN_KM);
        record.set_velocity(record.velocity() * (PARSEC_IN_KM / YEAR_IN_SECONDS));
    }

    pub fn denormalize(record: &mut BodyRecord) {
        record.mass *= SOLAR_MASS_IN_KG;
        record.set_position(record.position() / PARSEC_IN_KM);
        record.set_velocity(record.velocity() / (PARSEC_IN_KM / YEAR_IN_SECONDS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "id,name,class,mass,pos_x,pos_y,pos_z,vel_x,vel_y,vel_z";

    #[test]
    fn header_only_input_yields_no_bodies() {
        let bodies = load_csv(HEADER.as_bytes()).unwrap();
        assert!(bodies.is_empty());
    }

    #[test]
    fn parses_a_single_row() {
        let input = format!("{HEADER}\n0,Sun,STA,1.988469999999999977e+30,0,0,0,0,0,0");
        let bodies = load_csv(input.as_bytes()).unwrap();

        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].id, "0");
        assert_eq!(bodies[0].name, "Sun");
        assert_eq!(bodies[0].class, "STA");
        assert!((bodies[0].mass - 1.988469999999999977e+30).abs() < 1e15);
        assert_eq!(bodies[0].position(), Vec3::zero());
        assert_eq!(bodies[0].velocity(), Vec3::zero());
    }

    #[test]
    fn quoted_cells_with_escaped_quotes() {
        let input = format!("{HEADER}\n1,\"Alpha \"\"A\"\", core\",STA,1.0,1,2,3,4,5,6");
        let bodies = load_csv(input.as_bytes()).unwrap();
        assert_eq!(bodies[0].name, "Alpha \"A\", core");
        assert_eq!(bodies[0].position(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn wrong_header_is_rejected() {
        let input = "id,name,mass\n0,Sun,1.0";
        assert!(matches!(
            load_csv(input.as_bytes()),
            Err(SimError::MalformedInput(_))
        ));
    }

    #[test]
    fn malformed_row_is_rejected() {
        let input = format!("{HEADER}\n0,Sun,STA,not-a-number,0,0,0,0,0,0");
        assert!(matches!(
            load_csv(input.as_bytes()),
            Err(SimError::MalformedInput(_))
        ));
        let trailing = format!("{HEADER}\n0,Sun,STA,1.0,0,0,0,0,0,0,extra");
        assert!(matches!(
            load_csv(trailing.as_bytes()),
            Err(SimError::MalformedInput(_))
        ));
    }

    #[test]
    fn save_and_load_round_trips_doubles_exactly() {
        let records = vec![BodyRecord::new(
            "2",
            "Earth",
            "PLA",
            3.0034896149157645e-6,
            Vec3::new(1.4959787e8, -0.1, 1.0 / 3.0),
            Vec3::new(29.7846, 1e-17, -2.5e7),
        )];

        let mut buffer = Vec::new();
        save_csv(&mut buffer, &records).unwrap();
        let reloaded = load_csv(buffer.as_slice()).unwrap();
        assert_eq!(reloaded, records);
    }

    #[test]
    fn file_wrappers_round_trip_through_disk() {
        let records = vec![
            BodyRecord::new("0", "Sun", "STA", 1.0, Vec3::zero(), Vec3::zero()),
            BodyRecord::new(
                "1",
                "Halley",
                "COM",
                1.1e-16,
                Vec3::new(2.66e9, -1.0 / 7.0, 3.5e8),
                Vec3::new(-0.9, 11.0, 2.5e-3),
            ),
        ];

        let path =
            std::env::temp_dir().join(format!("nbody-sim-dataset-{}.csv", std::process::id()));
        save_csv_file(&path, &records).unwrap();
        // Overwrite once more to confirm create-and-truncate semantics.
        save_csv_file(&path, &records).unwrap();
        let reloaded = load_csv_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(reloaded, records);
    }

    #[test]
    fn parsec_year_units_invert_exactly() {
        let mut record = BodyRecord::new(
            "3",
            "Cloud",
            "GAS",
            3.5e29,
            Vec3::new(1.25, -0.5, 2.0),
            Vec3::new(0.001, 0.002, -0.003),
        );
        let original = record.clone();

        ParsecYearDataset::normalize(&mut record);
        assert!((record.mass - 3.5e29 / SOLAR_MASS_IN_KG).abs() < 1e-12);
        ParsecYearDataset::denormalize(&mut record);

        assert!((record.mass - original.mass).abs() <= original.mass * 1e-12);
        assert!((record.position() - original.position()).mag() < 1e-12);
        assert!((record.velocity() - original.velocity()).mag() < 1e-15);
    }
}
