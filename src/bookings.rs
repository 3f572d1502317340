//! Booking engine.
//!
//! A booking request walks schedule lookup, room lookup, bounds check and
//! conflict check before the single insert. The reads go to the pool and the
//! insert is one autocommit statement, so a rejected request writes nothing
//! and concurrent writers queue on SQLite's busy timeout instead of failing
//! a deferred transaction's lock upgrade.
//!
//! The conflict check and the insert are separate statements. Two requests
//! racing for the same seat can both pass the check; the unique index on
//! `(schedule_id, row, seat)` then rejects the loser, which is reported as
//! the same `Conflict` as a seat found taken by the check.

use std::collections::HashSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::{debug, info};

use crate::{
    catalog,
    entities::booking,
    error::{AppError, AppResult, conflict_on_unique},
    models::{Booking, NewBooking},
    schedules, seats,
};

const SEAT_TAKEN: &str = "seat is already booked";

/// `(row, seat)` pairs held by bookings under `schedule_id`.
pub async fn booked_seats(
    db: &impl ConnectionTrait,
    schedule_id: i32,
) -> AppResult<HashSet<(i32, i32)>> {
    let pairs: Vec<(i32, i32)> = booking::Entity::find()
        .select_only()
        .column(booking::Column::Row)
        .column(booking::Column::Seat)
        .filter(booking::Column::ScheduleId.eq(schedule_id))
        .into_tuple()
        .all(db)
        .await?;
    Ok(pairs.into_iter().collect())
}

async fn find_seat(
    db: &impl ConnectionTrait,
    req: &NewBooking,
) -> AppResult<Option<booking::Model>> {
    let existing = booking::Entity::find()
        .filter(booking::Column::ScheduleId.eq(req.schedule_id))
        .filter(booking::Column::Row.eq(req.row))
        .filter(booking::Column::Seat.eq(req.seat))
        .one(db)
        .await?;
    Ok(existing)
}

async fn insert_booking(db: &impl ConnectionTrait, req: &NewBooking) -> AppResult<booking::Model> {
    let model = booking::ActiveModel {
        id: Default::default(),
        schedule_id: Set(req.schedule_id),
        row: Set(req.row),
        seat: Set(req.seat),
        timestamp: Set(jiff::Timestamp::now().as_second()),
    }
    .insert(db)
    .await
    .map_err(|e| conflict_on_unique(e, SEAT_TAKEN))?;
    Ok(model)
}

pub async fn create_booking(db: &DatabaseConnection, req: NewBooking) -> AppResult<Booking> {
    let schedule = schedules::find_schedule(db, req.schedule_id)
        .await?
        .ok_or(AppError::not_found("schedule", req.schedule_id))?;

    let room = catalog::find_room(db, schedule.room_id)
        .await?
        .ok_or(AppError::not_found("room", schedule.room_id))?;

    if !seats::seat_in_bounds(&room, req.row, req.seat) {
        debug!(?req, "seat out of bounds");
        return Err(AppError::invalid(format!(
            "invalid seat for this room: row {} seat {} (room has {} rows of {} seats)",
            req.row, req.seat, room.rows, room.seats_per_row
        )));
    }

    if find_seat(db, &req).await?.is_some() {
        debug!(?req, "seat taken");
        return Err(AppError::conflict(SEAT_TAKEN));
    }

    let model = insert_booking(db, &req).await?;

    info!(
        booking_id = model.id,
        schedule_id = model.schedule_id,
        row = model.row,
        seat = model.seat,
        "seat booked"
    );
    model.try_into()
}

pub async fn get_booking(db: &impl ConnectionTrait, id: i32) -> AppResult<Booking> {
    booking::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::not_found("booking", id))?
        .try_into()
}

pub async fn list_for_schedule(
    db: &impl ConnectionTrait,
    schedule_id: i32,
) -> AppResult<Vec<Booking>> {
    schedules::find_schedule(db, schedule_id)
        .await?
        .ok_or(AppError::not_found("schedule", schedule_id))?;

    booking::Entity::find()
        .filter(booking::Column::ScheduleId.eq(schedule_id))
        .order_by_asc(booking::Column::Row)
        .order_by_asc(booking::Column::Seat)
        .all(db)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect()
}
