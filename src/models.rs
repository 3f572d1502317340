use jiff::{Timestamp, civil::DateTime};
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::{
    entities::{booking, movie, room, schedule},
    error::{AppError, AppResult},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: i32,
    pub name: String,
    pub rows: i32,
    pub seats_per_row: i32,
}

impl From<room::Model> for Room {
    fn from(m: room::Model) -> Self {
        Self { id: m.id, name: m.name, rows: m.rows, seats_per_row: m.seats_per_row }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomDetail {
    #[serde(flatten)]
    pub room: Room,
    pub schedules: Vec<Schedule>,
}

/// Every mutable room field. Used for both create and full-replace update.
#[derive(Clone, Debug, Deserialize)]
pub struct RoomInput {
    pub name: String,
    pub rows: i32,
    pub seats_per_row: i32,
}

impl RoomInput {
    pub fn validated(self) -> AppResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid("room name is required"));
        }
        if self.rows <= 0 {
            return Err(AppError::invalid("rows must be greater than 0"));
        }
        if self.seats_per_row <= 0 {
            return Err(AppError::invalid("seats_per_row must be greater than 0"));
        }
        Ok(Self { name, ..self })
    }

    pub fn apply(self, active: &mut room::ActiveModel) {
        active.name = Set(self.name);
        active.rows = Set(self.rows);
        active.seats_per_row = Set(self.seats_per_row);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    pub poster: String,
}

impl From<movie::Model> for Movie {
    fn from(m: movie::Model) -> Self {
        Self { id: m.id, title: m.title, poster: m.poster }
    }
}

/// Every mutable movie field. Used for both create and full-replace update.
#[derive(Clone, Debug, Deserialize)]
pub struct MovieInput {
    pub title: String,
    pub poster: String,
}

impl MovieInput {
    pub fn validated(self) -> AppResult<Self> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::invalid("movie title is required"));
        }
        let poster = self.poster.trim().to_string();
        if !is_http_url(&poster) {
            return Err(AppError::invalid("poster must be an http(s) URL"));
        }
        Ok(Self { title, poster })
    }

    pub fn apply(self, active: &mut movie::ActiveModel) {
        active.title = Set(self.title);
        active.poster = Set(self.poster);
    }
}

/// Absolute `http`/`https` URL with a plausible host: no whitespace anywhere,
/// and an authority of host characters with an optional port.
fn is_http_url(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("https://").or_else(|| s.strip_prefix("http://")) else {
        return false;
    };
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };
    let host_ok = !host.is_empty()
        && !host.starts_with(['.', '-'])
        && !host.ends_with('-')
        && !host.contains("..")
        && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    let port_ok = port.is_none_or(|p| !p.is_empty() && p.parse::<u16>().is_ok());
    host_ok && port_ok
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Schedule {
    pub id: i32,
    pub room_id: i32,
    pub start_time: DateTime,
    pub movie: Movie,
}

impl Schedule {
    pub fn from_parts(s: schedule::Model, movie: movie::Model) -> AppResult<Self> {
        Ok(Self {
            id: s.id,
            room_id: s.room_id,
            start_time: s.start_time.parse()?,
            movie: movie.into(),
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSchedule {
    pub room_id: i32,
    pub movie_id: i32,
    pub start_time: DateTime,
}

/// Body of `POST /rooms/{room_id}/schedules`; the room comes from the path.
#[derive(Clone, Debug, Deserialize)]
pub struct NewScheduleInRoom {
    pub movie_id: i32,
    pub start_time: DateTime,
}

impl NewScheduleInRoom {
    pub fn in_room(self, room_id: i32) -> NewSchedule {
        NewSchedule { room_id, movie_id: self.movie_id, start_time: self.start_time }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Booking {
    pub id: i32,
    pub schedule_id: i32,
    pub row: i32,
    pub seat: i32,
    pub timestamp: Timestamp,
}

impl TryFrom<booking::Model> for Booking {
    type Error = AppError;

    fn try_from(m: booking::Model) -> AppResult<Self> {
        Ok(Self {
            id: m.id,
            schedule_id: m.schedule_id,
            row: m.row,
            seat: m.seat,
            timestamp: Timestamp::from_second(m.timestamp)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct NewBooking {
    pub schedule_id: i32,
    pub row: i32,
    pub seat: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SeatStatus {
    pub row: i32,
    pub seat: i32,
    pub is_booked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeatingLayout {
    pub room_name: String,
    pub total_rows: i32,
    pub seats_per_row: i32,
    pub seating_layout: Vec<Vec<SeatStatus>>,
}
