use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait,
};
use tracing::debug;

use crate::{
    entities::{movie, room, schedule},
    error::{AppError, AppResult, conflict_on_foreign_key, conflict_on_unique},
    models::{Movie, MovieInput, Room, RoomDetail, RoomInput},
    schedules,
};

const ROOM_NAME_TAKEN: &str = "a room with this name already exists";
const MOVIE_TITLE_TAKEN: &str = "a movie with this title already exists";

fn room_in_use(action: &str, id: i32) -> String {
    format!("cannot {action} room {id}, it has existing schedules")
}

fn movie_in_use(action: &str, id: i32) -> String {
    format!("cannot {action} movie {id}, it has existing schedules")
}

pub async fn find_room(db: &impl ConnectionTrait, id: i32) -> AppResult<Option<room::Model>> {
    Ok(room::Entity::find_by_id(id).one(db).await?)
}

pub async fn find_movie(db: &impl ConnectionTrait, id: i32) -> AppResult<Option<movie::Model>> {
    Ok(movie::Entity::find_by_id(id).one(db).await?)
}

async fn room_has_schedules(db: &impl ConnectionTrait, room_id: i32) -> AppResult<bool> {
    let n = schedule::Entity::find()
        .filter(schedule::Column::RoomId.eq(room_id))
        .count(db)
        .await?;
    Ok(n > 0)
}

async fn movie_has_schedules(db: &impl ConnectionTrait, movie_id: i32) -> AppResult<bool> {
    let n = schedule::Entity::find()
        .filter(schedule::Column::MovieId.eq(movie_id))
        .count(db)
        .await?;
    Ok(n > 0)
}

/// Rejects `name` if a room other than `except` already carries it.
async fn ensure_room_name_free(
    db: &impl ConnectionTrait,
    name: &str,
    except: Option<i32>,
) -> AppResult<()> {
    let mut q = room::Entity::find().filter(room::Column::Name.eq(name));
    if let Some(id) = except {
        q = q.filter(room::Column::Id.ne(id));
    }
    if q.one(db).await?.is_some() {
        return Err(AppError::conflict(format!("a room named {name:?} already exists")));
    }
    Ok(())
}

async fn ensure_movie_title_free(
    db: &impl ConnectionTrait,
    title: &str,
    except: Option<i32>,
) -> AppResult<()> {
    let mut q = movie::Entity::find().filter(movie::Column::Title.eq(title));
    if let Some(id) = except {
        q = q.filter(movie::Column::Id.ne(id));
    }
    if q.one(db).await?.is_some() {
        return Err(AppError::conflict(format!("a movie titled {title:?} already exists")));
    }
    Ok(())
}

pub async fn list_rooms(db: &impl ConnectionTrait) -> AppResult<Vec<RoomDetail>> {
    let rooms = room::Entity::find().order_by_asc(room::Column::Id).all(db).await?;

    let mut by_room: HashMap<i32, Vec<_>> = HashMap::new();
    for s in schedules::list_schedules(db).await? {
        by_room.entry(s.room_id).or_default().push(s);
    }

    Ok(rooms
        .into_iter()
        .map(|r| {
            let schedules = by_room.remove(&r.id).unwrap_or_default();
            RoomDetail { room: r.into(), schedules }
        })
        .collect())
}

pub async fn get_room(db: &impl ConnectionTrait, id: i32) -> AppResult<RoomDetail> {
    let room = find_room(db, id).await?.ok_or(AppError::not_found("room", id))?;
    let schedules = schedules::list_for_room(db, id).await?;
    Ok(RoomDetail { room: room.into(), schedules })
}

pub async fn create_room(db: &DatabaseConnection, input: RoomInput) -> AppResult<Room> {
    let input = input.validated()?;
    ensure_room_name_free(db, &input.name, None).await?;

    let mut active = room::ActiveModel { ..Default::default() };
    input.apply(&mut active);
    let model = active
        .insert(db)
        .await
        .map_err(|e| conflict_on_unique(e, ROOM_NAME_TAKEN))?;

    debug!(room_id = model.id, name = %model.name, "room created");
    Ok(model.into())
}

/// Full replace. The write itself is conditioned on the room having no
/// schedules, so a schedule created after the checks still blocks it.
pub async fn update_room(db: &DatabaseConnection, id: i32, input: RoomInput) -> AppResult<Room> {
    let input = input.validated()?;
    find_room(db, id).await?.ok_or(AppError::not_found("room", id))?;
    if room_has_schedules(db, id).await? {
        return Err(AppError::conflict(room_in_use("update", id)));
    }
    ensure_room_name_free(db, &input.name, Some(id)).await?;

    let mut active = room::ActiveModel { ..Default::default() };
    input.apply(&mut active);
    let scheduled = schedule::Entity::find()
        .select_only()
        .column(schedule::Column::RoomId)
        .into_query();
    let updated = room::Entity::update_many()
        .set(active)
        .filter(room::Column::Id.eq(id))
        .filter(room::Column::Id.not_in_subquery(scheduled))
        .exec_with_returning(db)
        .await
        .map_err(|e| conflict_on_unique(e, ROOM_NAME_TAKEN))?;

    let Some(model) = updated.into_iter().next() else {
        return match find_room(db, id).await? {
            Some(_) => Err(AppError::conflict(room_in_use("update", id))),
            None => Err(AppError::not_found("room", id)),
        };
    };
    debug!(room_id = id, "room updated");
    Ok(model.into())
}

pub async fn delete_room(db: &DatabaseConnection, id: i32) -> AppResult<()> {
    find_room(db, id).await?.ok_or(AppError::not_found("room", id))?;
    if room_has_schedules(db, id).await? {
        return Err(AppError::conflict(room_in_use("delete", id)));
    }

    let res = room::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map_err(|e| conflict_on_foreign_key(e, &room_in_use("delete", id)))?;
    if res.rows_affected == 0 {
        return Err(AppError::not_found("room", id));
    }
    debug!(room_id = id, "room deleted");
    Ok(())
}

pub async fn list_movies(db: &impl ConnectionTrait) -> AppResult<Vec<Movie>> {
    let movies = movie::Entity::find().order_by_asc(movie::Column::Id).all(db).await?;
    Ok(movies.into_iter().map(Movie::from).collect())
}

pub async fn get_movie(db: &impl ConnectionTrait, id: i32) -> AppResult<Movie> {
    let movie = find_movie(db, id).await?.ok_or(AppError::not_found("movie", id))?;
    Ok(movie.into())
}

pub async fn create_movie(db: &DatabaseConnection, input: MovieInput) -> AppResult<Movie> {
    let input = input.validated()?;
    ensure_movie_title_free(db, &input.title, None).await?;

    let mut active = movie::ActiveModel { ..Default::default() };
    input.apply(&mut active);
    let model = active
        .insert(db)
        .await
        .map_err(|e| conflict_on_unique(e, MOVIE_TITLE_TAKEN))?;

    debug!(movie_id = model.id, title = %model.title, "movie created");
    Ok(model.into())
}

pub async fn update_movie(db: &DatabaseConnection, id: i32, input: MovieInput) -> AppResult<Movie> {
    let input = input.validated()?;
    find_movie(db, id).await?.ok_or(AppError::not_found("movie", id))?;
    if movie_has_schedules(db, id).await? {
        return Err(AppError::conflict(movie_in_use("update", id)));
    }
    ensure_movie_title_free(db, &input.title, Some(id)).await?;

    let mut active = movie::ActiveModel { ..Default::default() };
    input.apply(&mut active);
    let scheduled = schedule::Entity::find()
        .select_only()
        .column(schedule::Column::MovieId)
        .into_query();
    let updated = movie::Entity::update_many()
        .set(active)
        .filter(movie::Column::Id.eq(id))
        .filter(movie::Column::Id.not_in_subquery(scheduled))
        .exec_with_returning(db)
        .await
        .map_err(|e| conflict_on_unique(e, MOVIE_TITLE_TAKEN))?;

    let Some(model) = updated.into_iter().next() else {
        return match find_movie(db, id).await? {
            Some(_) => Err(AppError::conflict(movie_in_use("update", id))),
            None => Err(AppError::not_found("movie", id)),
        };
    };
    debug!(movie_id = id, "movie updated");
    Ok(model.into())
}

pub async fn delete_movie(db: &DatabaseConnection, id: i32) -> AppResult<()> {
    find_movie(db, id).await?.ok_or(AppError::not_found("movie", id))?;
    if movie_has_schedules(db, id).await? {
        return Err(AppError::conflict(movie_in_use("delete", id)));
    }

    let res = movie::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map_err(|e| conflict_on_foreign_key(e, &movie_in_use("delete", id)))?;
    if res.rows_affected == 0 {
        return Err(AppError::not_found("movie", id));
    }
    debug!(movie_id = id, "movie deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use tokio::task::JoinSet;

    use super::*;
    use crate::{
        db::{file_db, test_db},
        models::NewSchedule,
    };

    fn room_input(name: &str) -> RoomInput {
        RoomInput { name: name.to_string(), rows: 10, seats_per_row: 15 }
    }

    fn movie_input(title: &str) -> MovieInput {
        MovieInput { title: title.to_string(), poster: "https://example.com/p.jpg".to_string() }
    }

    async fn schedule_one(db: &DatabaseConnection, room_id: i32, movie_id: i32) {
        schedules::create_schedule(
            db,
            NewSchedule { room_id, movie_id, start_time: date(2025, 8, 15).at(18, 0, 0, 0) },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn room_names_are_unique() {
        let db = test_db().await;
        create_room(&db, room_input("Screen 1")).await.unwrap();

        let err = create_room(&db, room_input("Screen 1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(list_rooms(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_room_replaces_every_field() {
        let db = test_db().await;
        let room = create_room(&db, room_input("Screen 1")).await.unwrap();

        let updated = update_room(
            &db,
            room.id,
            RoomInput { name: "Screen 9".to_string(), rows: 4, seats_per_row: 6 },
        )
        .await
        .unwrap();

        let expected = Room { id: room.id, name: "Screen 9".into(), rows: 4, seats_per_row: 6 };
        assert_eq!(updated, expected);
    }

    #[tokio::test]
    async fn update_room_rejects_taken_name() {
        let db = test_db().await;
        create_room(&db, room_input("Screen 1")).await.unwrap();
        let second = create_room(&db, room_input("Screen 2")).await.unwrap();

        let err = update_room(&db, second.id, room_input("Screen 1")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Keeping its own name is fine.
        update_room(&db, second.id, room_input("Screen 2")).await.unwrap();
    }

    #[tokio::test]
    async fn missing_room_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            get_room(&db, 42).await,
            Err(AppError::NotFound { entity: "room", id: 42 })
        ));
        assert!(matches!(delete_room(&db, 42).await, Err(AppError::NotFound { .. })));
        assert!(matches!(
            update_room(&db, 42, room_input("x")).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn scheduled_room_cannot_change_or_go() {
        let db = test_db().await;
        let room = create_room(&db, room_input("Screen 1")).await.unwrap();
        let movie = create_movie(&db, movie_input("The Matrix")).await.unwrap();
        schedule_one(&db, room.id, movie.id).await;

        assert!(matches!(delete_room(&db, room.id).await, Err(AppError::Conflict(_))));
        assert!(matches!(
            update_room(&db, room.id, room_input("Screen 1")).await,
            Err(AppError::Conflict(_))
        ));

        let detail = get_room(&db, room.id).await.unwrap();
        assert_eq!(detail.schedules.len(), 1);
        assert_eq!(detail.schedules[0].movie.title, "The Matrix");
    }

    #[tokio::test]
    async fn unscheduled_room_can_be_deleted() {
        let db = test_db().await;
        let room = create_room(&db, room_input("Screen 1")).await.unwrap();

        delete_room(&db, room.id).await.unwrap();
        assert!(find_room(&db, room.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn movie_titles_are_unique() {
        let db = test_db().await;
        let first = create_movie(&db, movie_input("The Matrix")).await.unwrap();
        let err = create_movie(&db, movie_input("The Matrix")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let other = create_movie(&db, movie_input("Alien")).await.unwrap();
        let err = update_movie(&db, other.id, movie_input("The Matrix")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert_eq!(list_movies(&db).await.unwrap(), vec![first, other]);
    }

    #[tokio::test]
    async fn scheduled_movie_cannot_change_or_go() {
        let db = test_db().await;
        let room = create_room(&db, room_input("Screen 1")).await.unwrap();
        let movie = create_movie(&db, movie_input("The Matrix")).await.unwrap();
        schedule_one(&db, room.id, movie.id).await;

        assert!(matches!(delete_movie(&db, movie.id).await, Err(AppError::Conflict(_))));
        assert!(matches!(
            update_movie(&db, movie.id, movie_input("Matrix Reloaded")).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(get_movie(&db, movie.id).await.unwrap().title, "The Matrix");
    }

    #[tokio::test]
    async fn unscheduled_movie_can_be_updated_and_deleted() {
        let db = test_db().await;
        let movie = create_movie(&db, movie_input("The Matrix")).await.unwrap();

        let updated = update_movie(
            &db,
            movie.id,
            MovieInput { title: "Alien".into(), poster: "https://example.com/alien.jpg".into() },
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "Alien");
        assert_eq!(updated.poster, "https://example.com/alien.jpg");

        delete_movie(&db, movie.id).await.unwrap();
        assert!(matches!(get_movie(&db, movie.id).await, Err(AppError::NotFound { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_of_one_room_name_have_one_winner() {
        let (_dir, db) = file_db().await;

        let mut tasks = JoinSet::new();
        for _ in 0..12 {
            let db = db.clone();
            tasks.spawn(async move { create_room(&db, room_input("Screen 1")).await });
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

        // Distinct writers alongside each other all land.
        let mut tasks = JoinSet::new();
        for i in 0..12 {
            let db = db.clone();
            tasks.spawn(async move { create_movie(&db, movie_input(&format!("Film {i}"))).await });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap().unwrap();
        }
        assert_eq!(list_movies(&db).await.unwrap().len(), 12);
    }

    #[tokio::test]
    async fn deleting_a_missing_room_or_movie_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            delete_room(&db, 8).await,
            Err(AppError::NotFound { entity: "room", .. })
        ));
        assert!(matches!(
            delete_movie(&db, 8).await,
            Err(AppError::NotFound { entity: "movie", .. })
        ));
    }
}
