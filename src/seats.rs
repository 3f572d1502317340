//! Seat availability: the full `rows × seats_per_row` grid of a schedule's
//! room, with each cell flagged by whether a booking holds it.

use std::collections::HashSet;

use sea_orm::ConnectionTrait;

use crate::{
    bookings, catalog,
    entities::{room, schedule},
    error::{AppError, AppResult},
    models::{SeatStatus, SeatingLayout},
    schedules,
};

/// Seats are 1-indexed in both dimensions.
pub fn seat_in_bounds(room: &room::Model, row: i32, seat: i32) -> bool {
    (1..=room.rows).contains(&row) && (1..=room.seats_per_row).contains(&seat)
}

pub fn build_layout(room: &room::Model, booked: &HashSet<(i32, i32)>) -> SeatingLayout {
    let seating_layout = (1..=room.rows)
        .map(|row| {
            (1..=room.seats_per_row)
                .map(|seat| SeatStatus { row, seat, is_booked: booked.contains(&(row, seat)) })
                .collect()
        })
        .collect();

    SeatingLayout {
        room_name: room.name.clone(),
        total_rows: room.rows,
        seats_per_row: room.seats_per_row,
        seating_layout,
    }
}

pub async fn seating_for_schedule(
    db: &impl ConnectionTrait,
    schedule_id: i32,
) -> AppResult<SeatingLayout> {
    let schedule = schedules::find_schedule(db, schedule_id)
        .await?
        .ok_or(AppError::not_found("schedule", schedule_id))?;
    layout_of(db, &schedule).await
}

/// Layout of the first showing of `movie_id` in `room_id`.
pub async fn seating_for_movie_in_room(
    db: &impl ConnectionTrait,
    movie_id: i32,
    room_id: i32,
) -> AppResult<SeatingLayout> {
    let Some(schedule) = schedules::first_for_movie_in_room(db, movie_id, room_id).await? else {
        return Err(AppError::NoShowing { movie_id, room_id });
    };
    layout_of(db, &schedule).await
}

async fn layout_of(
    db: &impl ConnectionTrait,
    schedule: &schedule::Model,
) -> AppResult<SeatingLayout> {
    let room = catalog::find_room(db, schedule.room_id)
        .await?
        .ok_or(AppError::not_found("room", schedule.room_id))?;
    let booked = bookings::booked_seats(db, schedule.id).await?;
    Ok(build_layout(&room, &booked))
}
