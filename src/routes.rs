use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
    routing::get,
};
use serde_json::{Value, json};

use crate::{
    AppState, bookings, catalog,
    error::{AppError, AppResult},
    models::{
        Booking, Movie, MovieInput, NewBooking, NewSchedule, NewScheduleInRoom, Room, RoomDetail,
        RoomInput, Schedule, SeatingLayout,
    },
    schedules, seats,
};

/// JSON body whose rejection is reported as `InvalidInput`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Body<T>(pub T);

/// Path parameters whose rejection is reported as `InvalidInput`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

type Shared = State<Arc<AppState>>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "OK" }))
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/", get(list_rooms).post(create_room))
        .route("/rooms/{room_id}", get(get_room).put(update_room).delete(delete_room))
        .route("/rooms/{room_id}/schedules", get(room_schedules).post(create_room_schedule))
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/", get(list_movies).post(create_movie))
        .route("/movies/{movie_id}", get(get_movie).put(update_movie).delete(delete_movie))
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route("/schedules/", get(list_schedules).post(create_schedule))
        .route("/schedules/{schedule_id}", get(get_schedule))
        .route("/schedules/{schedule_id}/seats", get(schedule_seats))
        .route("/schedules/{schedule_id}/bookings", get(schedule_bookings))
        .route("/bookings", axum::routing::post(create_booking))
        .route("/bookings/", axum::routing::post(create_booking))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/movies/{movie_id}/rooms/{room_id}/seats", get(movie_room_seats))
        .with_state(state)
}

async fn index() -> Json<Value> {
    Json(json!({ "name": env!("CARGO_PKG_NAME"), "status": "ok" }))
}

async fn list_rooms(State(state): Shared) -> AppResult<Json<Vec<RoomDetail>>> {
    Ok(Json(catalog::list_rooms(&state.db).await?))
}

async fn get_room(State(state): Shared, Path(id): Path<i32>) -> AppResult<Json<RoomDetail>> {
    Ok(Json(catalog::get_room(&state.db, id).await?))
}

async fn create_room(
    State(state): Shared,
    Body(input): Body<RoomInput>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let room = catalog::create_room(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn update_room(
    State(state): Shared,
    Path(id): Path<i32>,
    Body(input): Body<RoomInput>,
) -> AppResult<Json<Room>> {
    Ok(Json(catalog::update_room(&state.db, id, input).await?))
}

async fn delete_room(State(state): Shared, Path(id): Path<i32>) -> AppResult<StatusCode> {
    catalog::delete_room(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn room_schedules(
    State(state): Shared,
    Path(room_id): Path<i32>,
) -> AppResult<Json<Vec<Schedule>>> {
    Ok(Json(schedules::list_for_room(&state.db, room_id).await?))
}

async fn create_room_schedule(
    State(state): Shared,
    Path(room_id): Path<i32>,
    Body(input): Body<NewScheduleInRoom>,
) -> AppResult<(StatusCode, Json<Schedule>)> {
    let schedule = schedules::create_schedule(&state.db, input.in_room(room_id)).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn list_movies(State(state): Shared) -> AppResult<Json<Vec<Movie>>> {
    Ok(Json(catalog::list_movies(&state.db).await?))
}

async fn get_movie(State(state): Shared, Path(id): Path<i32>) -> AppResult<Json<Movie>> {
    Ok(Json(catalog::get_movie(&state.db, id).await?))
}

async fn create_movie(
    State(state): Shared,
    Body(input): Body<MovieInput>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    let movie = catalog::create_movie(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(movie)))
}

async fn update_movie(
    State(state): Shared,
    Path(id): Path<i32>,
    Body(input): Body<MovieInput>,
) -> AppResult<Json<Movie>> {
    Ok(Json(catalog::update_movie(&state.db, id, input).await?))
}

async fn delete_movie(State(state): Shared, Path(id): Path<i32>) -> AppResult<StatusCode> {
    catalog::delete_movie(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_schedules(State(state): Shared) -> AppResult<Json<Vec<Schedule>>> {
    Ok(Json(schedules::list_schedules(&state.db).await?))
}

async fn create_schedule(
    State(state): Shared,
    Body(input): Body<NewSchedule>,
) -> AppResult<(StatusCode, Json<Schedule>)> {
    let schedule = schedules::create_schedule(&state.db, input).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn get_schedule(State(state): Shared, Path(id): Path<i32>) -> AppResult<Json<Schedule>> {
    Ok(Json(schedules::get_schedule(&state.db, id).await?))
}

async fn schedule_seats(
    State(state): Shared,
    Path(schedule_id): Path<i32>,
) -> AppResult<Json<SeatingLayout>> {
    Ok(Json(seats::seating_for_schedule(&state.db, schedule_id).await?))
}

async fn schedule_bookings(
    State(state): Shared,
    Path(schedule_id): Path<i32>,
) -> AppResult<Json<Vec<Booking>>> {
    Ok(Json(bookings::list_for_schedule(&state.db, schedule_id).await?))
}

async fn create_booking(
    State(state): Shared,
    Body(req): Body<NewBooking>,
) -> AppResult<(StatusCode, Json<Booking>)> {
    let booking = bookings::create_booking(&state.db, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(State(state): Shared, Path(id): Path<i32>) -> AppResult<Json<Booking>> {
    Ok(Json(bookings::get_booking(&state.db, id).await?))
}

async fn movie_room_seats(
    State(state): Shared,
    Path((movie_id, room_id)): Path<(i32, i32)>,
) -> AppResult<Json<SeatingLayout>> {
    Ok(Json(seats::seating_for_movie_in_room(&state.db, movie_id, room_id).await?))
}
