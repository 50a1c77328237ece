use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: Option<String>,

    /// Argon2id PHC string (algorithm, params, salt and digest)
    pub password_hash: Option<String>,

    #[sea_orm(unique)]
    pub google_id: Option<String>,

    #[sea_orm(unique)]
    pub facebook_id: Option<String>,

    pub secret: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
