//! Measurement block of the probe
//!
//! Eight `f32` values occupy registers 0x0000..0x0010. Each float spans two
//! registers and arrives in the probe's own word order, see [`decode_float`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of floats in the measurement block
pub const MEASUREMENT_COUNT: usize = 8;

/// Bytes per float on the wire
pub const FLOAT_LEN: usize = 4;

/// Byte count of the measurement block
pub const BLOCK_LEN: usize = MEASUREMENT_COUNT * FLOAT_LEN;

/// A named value in the measurement block, in register order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    /// Fuel level
    FuelLevel,
    /// Water level at the tank bottom
    WaterLevel,
    /// Average fuel temperature
    FuelAvgTemp,
    /// Point temperature A (lowest sensor)
    PointTempA,
    /// Point temperature B
    PointTempB,
    /// Point temperature C
    PointTempC,
    /// Point temperature D
    PointTempD,
    /// Point temperature E
    PointTempE,
}

impl Measurement {
    /// All measurements in register order
    pub const ALL: [Measurement; MEASUREMENT_COUNT] = [
        Measurement::FuelLevel,
        Measurement::WaterLevel,
        Measurement::FuelAvgTemp,
        Measurement::PointTempA,
        Measurement::PointTempB,
        Measurement::PointTempC,
        Measurement::PointTempD,
        Measurement::PointTempE,
    ];

    /// Position in the block
    pub fn index(self) -> usize {
        self as usize
    }

    /// First 16-bit register holding this value
    pub fn register(self) -> u16 {
        super::frame::DATA_REGISTER + (self as u16) * 2
    }

    /// Column name used in CSV/JSON output
    pub fn key(self) -> &'static str {
        match self {
            Measurement::FuelLevel => "fuel_level",
            Measurement::WaterLevel => "water_level",
            Measurement::FuelAvgTemp => "fuel_avg_temp",
            Measurement::PointTempA => "point_temp_a",
            Measurement::PointTempB => "point_temp_b",
            Measurement::PointTempC => "point_temp_c",
            Measurement::PointTempD => "point_temp_d",
            Measurement::PointTempE => "point_temp_e",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Measurement::FuelLevel => "Fuel level",
            Measurement::WaterLevel => "Water level",
            Measurement::FuelAvgTemp => "Fuel avg temp",
            Measurement::PointTempA => "Point temp A",
            Measurement::PointTempB => "Point temp B",
            Measurement::PointTempC => "Point temp C",
            Measurement::PointTempD => "Point temp D",
            Measurement::PointTempE => "Point temp E",
        };
        f.write_str(label)
    }
}

/// One complete reading of the probe
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeasurementSet {
    values: [f32; MEASUREMENT_COUNT],
}

impl MeasurementSet {
    /// Wrap values given in register order
    pub fn new(values: [f32; MEASUREMENT_COUNT]) -> Self {
        Self { values }
    }

    /// Decode a 32-byte measurement block
    pub fn from_block(block: &[u8; BLOCK_LEN]) -> Self {
        let mut values = [0.0f32; MEASUREMENT_COUNT];
        for (value, chunk) in values.iter_mut().zip(block.chunks_exact(FLOAT_LEN)) {
            *value = decode_float([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { values }
    }

    /// Encode as the probe would send it
    pub fn to_block(&self) -> [u8; BLOCK_LEN] {
        let mut block = [0u8; BLOCK_LEN];
        for (chunk, value) in block.chunks_exact_mut(FLOAT_LEN).zip(self.values) {
            chunk.copy_from_slice(&encode_float(value));
        }
        block
    }

    /// Value of one measurement
    pub fn get(&self, measurement: Measurement) -> f32 {
        self.values[measurement.index()]
    }

    /// Raw values in register order
    pub fn values(&self) -> &[f32; MEASUREMENT_COUNT] {
        &self.values
    }

    /// Fuel level
    pub fn fuel_level(&self) -> f32 {
        self.get(Measurement::FuelLevel)
    }

    /// Water level
    pub fn water_level(&self) -> f32 {
        self.get(Measurement::WaterLevel)
    }

    /// Average fuel temperature
    pub fn fuel_avg_temp(&self) -> f32 {
        self.get(Measurement::FuelAvgTemp)
    }

    /// Point temperatures A through E
    pub fn point_temps(&self) -> [f32; 5] {
        [
            self.get(Measurement::PointTempA),
            self.get(Measurement::PointTempB),
            self.get(Measurement::PointTempC),
            self.get(Measurement::PointTempD),
            self.get(Measurement::PointTempE),
        ]
    }

    /// Iterate `(measurement, value)` pairs in register order
    pub fn iter(&self) -> impl Iterator<Item = (Measurement, f32)> + '_ {
        Measurement::ALL.iter().map(move |&m| (m, self.get(m)))
    }
}

/// Reassemble one float from its four wire bytes.
///
/// The probe sends `[w0, w1, w2, w3]`; the little-endian representation of
/// the value is `[w2, w3, w0, w1]`.
pub fn decode_float(wire: [u8; FLOAT_LEN]) -> f32 {
    f32::from_le_bytes([wire[2], wire[3], wire[0], wire[1]])
}

/// Inverse of [`decode_float`]
pub fn encode_float(value: f32) -> [u8; FLOAT_LEN] {
    let le = value.to_le_bytes();
    [le[2], le[3], le[0], le[1]]
}
