use time::{UtcOffset, macros::format_description};

use crate::core::db::{Reading, StoredReading};

pub const GREETING: &str =
    "¡Hola! Envíame una foto del visor de tu báscula y leeré el peso por ti.";
pub const NO_OBJECTS: &str = "No pude detectar ningún objeto en la imagen.";
pub const LOW_CONFIDENCE: &str = "Detecté objetos pero con baja confianza.";
pub const NO_DATABASE: &str = "⚠️ Error: No hay conexión a la base de datos.";
pub const EMPTY_HISTORY: &str = "📭 La base de datos está vacía.";
pub const NOT_ENOUGH_DATA: &str =
    "📉 No hay suficientes datos confirmados para generar una gráfica.";
pub const NON_NUMERIC_DATA: &str =
    "⚠️ Error: Hay datos no numéricos en la base de datos que impiden generar la gráfica.";
pub const CHART_CAPTION: &str = "📊 Evolución de peso (último año).";
pub const IMAGE_FAILURE: &str = "⚠️ No pude procesar la imagen.";
pub const STORAGE_FAILURE: &str = "⚠️ Error al consultar la base de datos.";
pub const GENERIC_FAILURE: &str = "⚠️ Ocurrió un error al procesar tu mensaje.";

pub fn ask_confirmation(reading: &str) -> String {
    format!("Tu peso es {}? (Responde SI / NO)", reading)
}

pub fn saved(reading: &Reading) -> String {
    format!("✅ Peso {} guardado correctamente.", reading)
}

pub fn discarded(reading: &Reading) -> String {
    format!("❌ Peso {} descartado.", reading)
}

pub fn invalid_reading(raw: &str) -> String {
    format!("⚠️ La lectura {} no es un número válido y no se guardó.", raw)
}

pub fn echo(text: &str) -> String {
    format!("Recibí tu mensaje: {}", text)
}

/// Markdown list of stored readings, in the order given.
pub fn history(rows: &[StoredReading], offset: UtcOffset) -> String {
    let fmt = format_description!("[day]/[month] [hour]:[minute]");
    let mut message = format!("📋 *Últimos {} pesajes:*\n\n", rows.len());
    for row in rows {
        let icon = if row.confirmed == Some(true) { "✅" } else { "❌" };
        let date = row
            .created
            .to_offset(offset)
            .format(&fmt)
            .unwrap_or_else(|_| "--/-- --:--".to_string());
        message.push_str(&format!("{} {} kg ({})\n", icon, row.weight, date));
    }
    message
}
