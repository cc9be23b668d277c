use crate::adc_types::BitWidth;

/// Nominal reference voltage used when no calibration is available.
pub const FALLBACK_REFERENCE_MV: u32 = 1100;

/// Sensor output at 0 °C and its slope.
const TEMPERATURE_OFFSET_MV: f32 = 300.0;
const TEMPERATURE_SLOPE_MV_PER_C: f32 = 10.0;

// Raw code to mV without calibration: V = raw * 1100 / 2^bitwidth (truncating)
pub fn uncalibrated_millivolts(raw: u16, bitwidth: BitWidth) -> u32 {
    raw as u32 * FALLBACK_REFERENCE_MV / bitwidth.full_scale()
}

// T = (V - 300 mV) / 10 mV/°C
pub fn millivolts_to_celsius(voltage_mv: f32) -> f32 {
    (voltage_mv - TEMPERATURE_OFFSET_MV) / TEMPERATURE_SLOPE_MV_PER_C
}
