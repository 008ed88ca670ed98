use serde::{Deserialize, Serialize};

/// A booked appointment as served by the booking backend.
///
/// Everything except `id` is display data and is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    #[serde(default)]
    pub doctor_name: String,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub image: String,
}

/// Complete list of upcoming appointments, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSnapshot {
    #[serde(default)]
    pub upcoming: Vec<Appointment>,
}

impl AppointmentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.upcoming.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upcoming.len()
    }
}
