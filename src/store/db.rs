//! PostgreSQL store on sea-orm.

use super::{Page, Paginated, Store, StoreError};
use crate::orm::{polls, users, votes};
use crate::poll::{NewPoll, NewVote, OptionCount, Poll, PollFilter, StatusFilter, Vote};
use crate::user::{NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sea_orm::prelude::Json;
use sea_orm::sea_query::Expr;
use sea_orm::{
    entity::*, query::*, Condition, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbBackend, DbErr, FromQueryResult, PaginatorTrait, Statement, TransactionTrait,
};
use std::time::Duration;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(url.to_owned());
        opt.max_connections(max_connections)
            .connect_timeout(Duration::from_secs(10));

        let db = Database::connect(opt).await?;
        Ok(Self { db })
    }

    /// Creates missing tables and indexes. Safe to run on every start.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for sql in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.db
                .execute(Statement::from_string(DbBackend::Postgres, sql.to_owned()))
                .await?;
        }
        Ok(())
    }
}

fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&dt)
}

/// Postgres reports constraint hits as plain query errors.
fn write_error(err: DbErr, what: &str) -> StoreError {
    let text = err.to_string();
    if text.contains("duplicate key") || text.contains("UNIQUE constraint") {
        StoreError::UniqueViolation(what.to_owned())
    } else {
        StoreError::Database(text)
    }
}

impl From<users::Model> for User {
    fn from(m: users::Model) -> Self {
        User {
            id: m.id,
            name: m.name,
            email: m.email,
            password: m.password,
            role: m.role,
            is_active: m.is_active,
            created_at: to_utc(m.created_at),
            updated_at: to_utc(m.updated_at),
        }
    }
}

impl From<votes::Model> for Vote {
    fn from(m: votes::Model) -> Self {
        Vote {
            id: m.id,
            poll_id: m.poll_id,
            user_id: m.user_id,
            selected_option: m.selected_option,
            ip_address: m.ip_address,
            user_agent: m.user_agent,
            created_at: to_utc(m.created_at),
        }
    }
}

impl TryFrom<polls::Model> for Poll {
    type Error = StoreError;

    fn try_from(m: polls::Model) -> Result<Self, Self::Error> {
        let options: Vec<String> = serde_json::from_value(m.options).map_err(|e| {
            StoreError::Database(format!("poll {} has malformed options: {}", m.id, e))
        })?;

        Ok(Poll {
            id: m.id,
            title: m.title,
            description: m.description,
            options,
            closing_date: to_utc(m.closing_date),
            is_closed: m.is_closed,
            is_anonymous: m.is_anonymous,
            allow_multiple_votes: m.allow_multiple_votes,
            created_by: m.created_by,
            created_at: to_utc(m.created_at),
            updated_at: to_utc(m.updated_at),
        })
    }
}

fn options_json(options: &[String]) -> Result<Json, StoreError> {
    serde_json::to_value(options).map_err(|e| StoreError::Database(e.to_string()))
}

fn status_condition(filter: &PollFilter) -> Option<Condition> {
    let now = filter.now.naive_utc();
    match filter.status? {
        StatusFilter::Open => Some(
            Condition::all()
                .add(polls::Column::IsClosed.eq(false))
                .add(polls::Column::ClosingDate.gt(now)),
        ),
        StatusFilter::Closed => Some(
            Condition::any()
                .add(polls::Column::IsClosed.eq(true))
                .add(polls::Column::ClosingDate.lte(now)),
        ),
    }
}

#[derive(Debug, FromQueryResult)]
struct OptionCountRow {
    selected_option: String,
    count: i64,
}

#[async_trait]
impl Store for DbStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now().naive_utc();
        let model = users::ActiveModel {
            name: Set(user.name),
            email: Set(user.email),
            password: Set(user.password),
            role: Set(user.role),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(|e| write_error(e, "User"))?;

        Ok(model.into())
    }

    async fn find_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(users::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await?
            .map(User::from))
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        Ok(users::Entity::find()
            .filter(users::Column::Name.eq(name))
            .one(&self.db)
            .await?
            .map(User::from))
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut model: users::ActiveModel = users::Entity::find_by_id(user.id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound("User".to_owned()))?
            .into();

        model.name = Set(user.name.clone());
        model.email = Set(user.email.clone());
        model.role = Set(user.role);
        model.is_active = Set(user.is_active);
        model.updated_at = Set(Utc::now().naive_utc());

        let model = model
            .update(&self.db)
            .await
            .map_err(|e| write_error(e, "User"))?;
        Ok(model.into())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(User::from)
            .collect())
    }

    async fn insert_poll(&self, poll: NewPoll) -> Result<Poll, StoreError> {
        let now = Utc::now().naive_utc();
        let model = polls::ActiveModel {
            title: Set(poll.title),
            description: Set(poll.description),
            options: Set(options_json(&poll.options)?),
            closing_date: Set(poll.closing_date.naive_utc()),
            is_closed: Set(false),
            is_anonymous: Set(poll.is_anonymous),
            allow_multiple_votes: Set(poll.allow_multiple_votes),
            created_by: Set(poll.created_by),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        model.try_into()
    }

    async fn find_poll(&self, id: i32) -> Result<Option<Poll>, StoreError> {
        polls::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Poll::try_from)
            .transpose()
    }

    async fn update_poll(&self, poll: &Poll) -> Result<Poll, StoreError> {
        let mut model: polls::ActiveModel = polls::Entity::find_by_id(poll.id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound("Poll".to_owned()))?
            .into();

        model.title = Set(poll.title.clone());
        model.description = Set(poll.description.clone());
        model.options = Set(options_json(&poll.options)?);
        model.closing_date = Set(poll.closing_date.naive_utc());
        model.is_closed = Set(poll.is_closed);
        model.is_anonymous = Set(poll.is_anonymous);
        model.allow_multiple_votes = Set(poll.allow_multiple_votes);
        model.updated_at = Set(Utc::now().naive_utc());

        model.update(&self.db).await?.try_into()
    }

    async fn delete_poll(&self, id: i32) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;

        votes::Entity::delete_many()
            .filter(votes::Column::PollId.eq(id))
            .exec(&txn)
            .await?;
        let res = polls::Entity::delete_by_id(id).exec(&txn).await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Err(StoreError::NotFound("Poll".to_owned()));
        }

        txn.commit().await?;
        Ok(())
    }

    async fn list_polls(&self, filter: &PollFilter, page: Page) -> Result<Paginated<Poll>, StoreError> {
        let mut query = polls::Entity::find();
        if let Some(owner) = filter.created_by {
            query = query.filter(polls::Column::CreatedBy.eq(owner));
        }
        if let Some(cond) = status_condition(filter) {
            query = query.filter(cond);
        }

        let total = query.clone().count(&self.db).await? as u64;
        let items = query
            .order_by_desc(polls::Column::CreatedAt)
            .order_by_desc(polls::Column::Id)
            .offset(page.offset())
            .limit(page.limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Poll::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated { items, total })
    }

    async fn close_expired_polls(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let now = now.naive_utc();
        let res = polls::Entity::update_many()
            .col_expr(polls::Column::IsClosed, Expr::value(true))
            .col_expr(polls::Column::UpdatedAt, Expr::value(now))
            .filter(polls::Column::IsClosed.eq(false))
            .filter(polls::Column::ClosingDate.lte(now))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    async fn insert_vote(&self, vote: NewVote) -> Result<Vote, StoreError> {
        let model = votes::ActiveModel {
            poll_id: Set(vote.poll_id),
            user_id: Set(vote.user_id),
            selected_option: Set(vote.selected_option),
            ip_address: Set(vote.ip_address),
            user_agent: Set(vote.user_agent),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(|e| write_error(e, "Vote"))?;

        Ok(model.into())
    }

    async fn find_vote(&self, id: i32) -> Result<Option<Vote>, StoreError> {
        Ok(votes::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Vote::from))
    }

    async fn find_user_vote(&self, poll_id: i32, user_id: i32) -> Result<Option<Vote>, StoreError> {
        Ok(votes::Entity::find()
            .filter(votes::Column::PollId.eq(poll_id))
            .filter(votes::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .map(Vote::from))
    }

    async fn delete_vote(&self, id: i32) -> Result<(), StoreError> {
        let res = votes::Entity::delete_by_id(id).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(StoreError::NotFound("Vote".to_owned()));
        }
        Ok(())
    }

    async fn count_votes(&self, poll_id: i32) -> Result<u64, StoreError> {
        Ok(votes::Entity::find()
            .filter(votes::Column::PollId.eq(poll_id))
            .count(&self.db)
            .await? as u64)
    }

    async fn count_votes_by_option(&self, poll_id: i32) -> Result<Vec<OptionCount>, StoreError> {
        let rows = OptionCountRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT selected_option, COUNT(*) AS count
            FROM votes
            WHERE poll_id = $1
            GROUP BY selected_option
            "#,
            vec![poll_id.into()],
        ))
        .all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OptionCount {
                option: r.selected_option,
                count: r.count.max(0) as u64,
            })
            .collect())
    }

    async fn list_poll_votes(&self, poll_id: i32) -> Result<Vec<(Vote, Option<User>)>, StoreError> {
        Ok(votes::Entity::find()
            .filter(votes::Column::PollId.eq(poll_id))
            .order_by_asc(votes::Column::CreatedAt)
            .order_by_asc(votes::Column::Id)
            .find_also_related(users::Entity)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|(vote, user)| (vote.into(), user.map(User::from)))
            .collect())
    }

    async fn list_user_votes(&self, user_id: i32, page: Page) -> Result<Paginated<Vote>, StoreError> {
        let query = votes::Entity::find().filter(votes::Column::UserId.eq(user_id));

        let total = query.clone().count(&self.db).await? as u64;
        let items = query
            .order_by_desc(votes::Column::CreatedAt)
            .order_by_desc(votes::Column::Id)
            .offset(page.offset())
            .limit(page.limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Vote::from)
            .collect();

        Ok(Paginated { items, total })
    }
}
