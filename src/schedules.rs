use jiff::civil::DateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Select, Set, SqlErr,
};
use tracing::debug;

use crate::{
    catalog,
    entities::{movie, schedule},
    error::{AppError, AppResult, conflict_on_unique},
    models::{NewSchedule, Schedule},
};

const SLOT_TAKEN: &str = "a schedule for this room at this start time already exists";

/// Canonical stored form of a start time. Sub-second precision is dropped so
/// two requests for the same minute land on the same key. Listings order by
/// this text, which sorts chronologically only for non-negative years.
pub fn slot_key(start_time: DateTime) -> AppResult<String> {
    if start_time.year() < 0 {
        return Err(AppError::invalid(format!(
            "start_time year must not be negative, got {}",
            start_time.year()
        )));
    }
    Ok(start_time.with().subsec_nanosecond(0).build()?.to_string())
}

pub async fn find_schedule(
    db: &impl ConnectionTrait,
    id: i32,
) -> AppResult<Option<schedule::Model>> {
    Ok(schedule::Entity::find_by_id(id).one(db).await?)
}

/// First showing of `movie_id` in `room_id`, by start time.
pub async fn first_for_movie_in_room(
    db: &impl ConnectionTrait,
    movie_id: i32,
    room_id: i32,
) -> AppResult<Option<schedule::Model>> {
    let s = schedule::Entity::find()
        .filter(schedule::Column::MovieId.eq(movie_id))
        .filter(schedule::Column::RoomId.eq(room_id))
        .order_by_asc(schedule::Column::StartTime)
        .order_by_asc(schedule::Column::Id)
        .one(db)
        .await?;
    Ok(s)
}

async fn with_movies(
    db: &impl ConnectionTrait,
    q: Select<schedule::Entity>,
) -> AppResult<Vec<Schedule>> {
    let rows = q
        .order_by_asc(schedule::Column::StartTime)
        .order_by_asc(schedule::Column::Id)
        .find_also_related(movie::Entity)
        .all(db)
        .await?;

    rows.into_iter()
        .map(|(s, m)| {
            let m = m.ok_or(AppError::not_found("movie", s.movie_id))?;
            Schedule::from_parts(s, m)
        })
        .collect()
}

pub async fn list_schedules(db: &impl ConnectionTrait) -> AppResult<Vec<Schedule>> {
    with_movies(db, schedule::Entity::find()).await
}

pub async fn list_for_room(db: &impl ConnectionTrait, room_id: i32) -> AppResult<Vec<Schedule>> {
    catalog::find_room(db, room_id).await?.ok_or(AppError::not_found("room", room_id))?;
    with_movies(db, schedule::Entity::find().filter(schedule::Column::RoomId.eq(room_id))).await
}

pub async fn get_schedule(db: &impl ConnectionTrait, id: i32) -> AppResult<Schedule> {
    let s = find_schedule(db, id).await?.ok_or(AppError::not_found("schedule", id))?;
    let m = catalog::find_movie(db, s.movie_id)
        .await?
        .ok_or(AppError::not_found("movie", s.movie_id))?;
    Schedule::from_parts(s, m)
}

pub async fn create_schedule(db: &DatabaseConnection, input: NewSchedule) -> AppResult<Schedule> {
    let start_time = slot_key(input.start_time)?;

    catalog::find_room(db, input.room_id)
        .await?
        .ok_or(AppError::not_found("room", input.room_id))?;
    let movie = catalog::find_movie(db, input.movie_id)
        .await?
        .ok_or(AppError::not_found("movie", input.movie_id))?;

    let clash = schedule::Entity::find()
        .filter(schedule::Column::RoomId.eq(input.room_id))
        .filter(schedule::Column::StartTime.eq(start_time.as_str()))
        .one(db)
        .await?;
    if clash.is_some() {
        return Err(AppError::conflict(SLOT_TAKEN));
    }

    let model = schedule::ActiveModel {
        id: Default::default(),
        room_id: Set(input.room_id),
        movie_id: Set(input.movie_id),
        start_time: Set(start_time),
    }
    .insert(db)
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            AppError::conflict("room or movie was deleted while scheduling")
        },
        _ => conflict_on_unique(e, SLOT_TAKEN),
    })?;

    debug!(
        schedule_id = model.id,
        room_id = model.room_id,
        movie_id = model.movie_id,
        start_time = %model.start_time,
        "schedule created"
    );
    Schedule::from_parts(model, movie)
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use tokio::task::JoinSet;

    use super::*;
    use crate::{
        db::{file_db, test_db},
        models::{MovieInput, RoomInput},
    };

    async fn room_and_movie(db: &DatabaseConnection) -> (i32, i32) {
        let room = catalog::create_room(
            db,
            RoomInput { name: "Screen 1".into(), rows: 10, seats_per_row: 15 },
        )
        .await
        .unwrap();
        let movie = catalog::create_movie(
            db,
            MovieInput { title: "The Matrix".into(), poster: "https://example.com/m.jpg".into() },
        )
        .await
        .unwrap();
        (room.id, movie.id)
    }

    #[tokio::test]
    async fn creates_schedule_with_embedded_movie() {
        let db = test_db().await;
        let (room_id, movie_id) = room_and_movie(&db).await;

        let s = create_schedule(
            &db,
            NewSchedule { room_id, movie_id, start_time: date(2025, 8, 15).at(18, 0, 0, 0) },
        )
        .await
        .unwrap();

        assert_eq!(s.room_id, room_id);
        assert_eq!(s.movie.id, movie_id);
        assert_eq!(s.start_time, date(2025, 8, 15).at(18, 0, 0, 0));
        assert_eq!(get_schedule(&db, s.id).await.unwrap(), s);
    }

    #[tokio::test]
    async fn one_schedule_per_room_and_start_time() {
        let db = test_db().await;
        let (room_id, movie_id) = room_and_movie(&db).await;
        let other_movie = catalog::create_movie(
            &db,
            MovieInput { title: "Alien".into(), poster: "https://example.com/a.jpg".into() },
        )
        .await
        .unwrap();
        let at = date(2025, 8, 15).at(18, 0, 0, 0);

        create_schedule(&db, NewSchedule { room_id, movie_id, start_time: at }).await.unwrap();

        // Same room and time collides regardless of the movie, and sub-second
        // noise does not dodge the key.
        let err = create_schedule(
            &db,
            NewSchedule { room_id, movie_id: other_movie.id, start_time: at },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = create_schedule(
            &db,
            NewSchedule { room_id, movie_id, start_time: date(2025, 8, 15).at(18, 0, 0, 500) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let later = date(2025, 8, 15).at(21, 0, 0, 0);
        create_schedule(&db, NewSchedule { room_id, movie_id, start_time: later }).await.unwrap();
        assert_eq!(list_for_room(&db, room_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_negative_years() {
        let db = test_db().await;
        let (room_id, movie_id) = room_and_movie(&db).await;

        for year in [-1, -2025] {
            let start_time = date(year, 1, 1).at(18, 0, 0, 0);
            let err = create_schedule(&db, NewSchedule { room_id, movie_id, start_time }).await;
            assert!(matches!(err, Err(AppError::InvalidInput(_))), "{year} -> {err:?}");
        }
        assert_eq!(slot_key(date(9999, 12, 31).at(23, 0, 0, 0)).unwrap(), "9999-12-31T23:00:00");
        assert!(list_schedules(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requires_existing_room_and_movie() {
        let db = test_db().await;
        let (room_id, movie_id) = room_and_movie(&db).await;
        let at = date(2025, 8, 15).at(18, 0, 0, 0);

        let err =
            create_schedule(&db, NewSchedule { room_id: 99, movie_id, start_time: at }).await;
        assert!(matches!(err, Err(AppError::NotFound { entity: "room", id: 99 })));

        let err =
            create_schedule(&db, NewSchedule { room_id, movie_id: 77, start_time: at }).await;
        assert!(matches!(err, Err(AppError::NotFound { entity: "movie", id: 77 })));

        assert!(list_schedules(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn room_listing_is_chronological() {
        let db = test_db().await;
        let (room_id, movie_id) = room_and_movie(&db).await;
        for hour in [21, 15, 18] {
            let start_time = date(2025, 8, 15).at(hour, 0, 0, 0);
            create_schedule(&db, NewSchedule { room_id, movie_id, start_time }).await.unwrap();
        }

        let listed = list_for_room(&db, room_id).await.unwrap();
        let hours: Vec<i8> = listed.iter().map(|s| s.start_time.hour()).collect();
        assert_eq!(hours, vec![15, 18, 21]);

        assert!(matches!(list_for_room(&db, 404).await, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn first_showing_of_movie_in_room() {
        let db = test_db().await;
        let (room_id, movie_id) = room_and_movie(&db).await;
        assert!(first_for_movie_in_room(&db, movie_id, room_id).await.unwrap().is_none());

        for day in [20, 16] {
            let start_time = date(2025, 8, day).at(18, 0, 0, 0);
            create_schedule(&db, NewSchedule { room_id, movie_id, start_time }).await.unwrap();
        }

        let first = first_for_movie_in_room(&db, movie_id, room_id).await.unwrap().unwrap();
        assert_eq!(first.start_time, "2025-08-16T18:00:00");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_for_one_slot_have_one_winner() {
        let (_dir, db) = file_db().await;
        let (room_id, movie_id) = room_and_movie(&db).await;
        let start_time = date(2025, 8, 15).at(18, 0, 0, 0);

        let mut tasks = JoinSet::new();
        for _ in 0..12 {
            let db = db.clone();
            tasks.spawn(async move {
                create_schedule(&db, NewSchedule { room_id, movie_id, start_time }).await
            });
        }
        let (mut created, mut conflicts) = (0, 0);
        while let Some(res) = tasks.join_next().await {
            match res.unwrap() {
                Ok(_) => created += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((created, conflicts), (1, 11));
        assert_eq!(list_for_room(&db, room_id).await.unwrap().len(), 1);
    }
}
