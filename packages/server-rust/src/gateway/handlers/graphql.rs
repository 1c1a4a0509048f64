//! GraphQL schema served at `/graphql`.
//!
//! Resolvers translate into the same [`EntityClient`] calls as REST. Errors
//! carry their kind in `extensions.code` (`NOT_FOUND`, `INTERNAL`,
//! `INVALID_ARGUMENT`).

use async_graphql::http::GraphiQLSource;
use async_graphql::{
    Context, EmptySubscription, ErrorExtensions, Object, Schema, SimpleObject, ID,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use gridline_core::{Entity, EntityFields, EntityId, EntityKind};

use super::{GatewayClients, GatewayState};
use crate::rpc::RpcError;

pub type GatewaySchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// A Formula 1 driver.
#[derive(SimpleObject)]
#[graphql(name = "Formula1")]
pub struct Formula1 {
    pub id: ID,
    pub name: String,
    pub team: String,
}

/// A MotoGP rider.
#[derive(SimpleObject)]
#[graphql(name = "MotoGP")]
pub struct MotoGp {
    pub id: ID,
    pub name: String,
    pub team: String,
}

impl From<Entity> for Formula1 {
    fn from(entity: Entity) -> Self {
        Self {
            id: ID(entity.id.into_inner()),
            name: entity.name,
            team: entity.team,
        }
    }
}

impl From<Entity> for MotoGp {
    fn from(entity: Entity) -> Self {
        Self {
            id: ID(entity.id.into_inner()),
            name: entity.name,
            team: entity.team,
        }
    }
}

fn to_graphql_error(err: RpcError) -> async_graphql::Error {
    let code = err.kind().code();
    async_graphql::Error::new(err.to_string()).extend_with(|_, ext| ext.set("code", code))
}

fn clients<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a GatewayClients> {
    ctx.data::<GatewayClients>()
}

fn deleted_message(kind: EntityKind, id: &ID) -> String {
    format!("{} with ID {} deleted successfully", kind.title(), id.as_str())
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    #[graphql(name = "formula1Driver")]
    async fn formula1_driver(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Formula1> {
        clients(ctx)?
            .drivers
            .get(EntityId::from(id.0))
            .await
            .map(Formula1::from)
            .map_err(to_graphql_error)
    }

    #[graphql(name = "formula1Drivers")]
    async fn formula1_drivers(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Formula1>> {
        let all = clients(ctx)?
            .drivers
            .list()
            .await
            .map_err(to_graphql_error)?;
        Ok(all.into_iter().map(Formula1::from).collect())
    }

    #[graphql(name = "motoGPRider")]
    async fn moto_gp_rider(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<MotoGp> {
        clients(ctx)?
            .riders
            .get(EntityId::from(id.0))
            .await
            .map(MotoGp::from)
            .map_err(to_graphql_error)
    }

    #[graphql(name = "motoGPRiders")]
    async fn moto_gp_riders(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<MotoGp>> {
        let all = clients(ctx)?
            .riders
            .list()
            .await
            .map_err(to_graphql_error)?;
        Ok(all.into_iter().map(MotoGp::from).collect())
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    #[graphql(name = "addFormula1Driver")]
    async fn add_formula1_driver(
        &self,
        ctx: &Context<'_>,
        name: String,
        team: String,
    ) -> async_graphql::Result<Formula1> {
        clients(ctx)?
            .drivers
            .create(EntityFields { name, team })
            .await
            .map(Formula1::from)
            .map_err(to_graphql_error)
    }

    #[graphql(name = "updateFormula1Driver")]
    async fn update_formula1_driver(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
        team: String,
    ) -> async_graphql::Result<Formula1> {
        clients(ctx)?
            .drivers
            .update(EntityId::from(id.0), EntityFields { name, team })
            .await
            .map(Formula1::from)
            .map_err(to_graphql_error)
    }

    #[graphql(name = "deleteFormula1Driver")]
    async fn delete_formula1_driver(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<String> {
        clients(ctx)?
            .drivers
            .delete(EntityId::from(id.0.clone()))
            .await
            .map_err(to_graphql_error)?;
        Ok(deleted_message(EntityKind::Driver, &id))
    }

    #[graphql(name = "addMotoGPRider")]
    async fn add_moto_gp_rider(
        &self,
        ctx: &Context<'_>,
        name: String,
        team: String,
    ) -> async_graphql::Result<MotoGp> {
        clients(ctx)?
            .riders
            .create(EntityFields { name, team })
            .await
            .map(MotoGp::from)
            .map_err(to_graphql_error)
    }

    #[graphql(name = "updateMotoGPRider")]
    async fn update_moto_gp_rider(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
        team: String,
    ) -> async_graphql::Result<MotoGp> {
        clients(ctx)?
            .riders
            .update(EntityId::from(id.0), EntityFields { name, team })
            .await
            .map(MotoGp::from)
            .map_err(to_graphql_error)
    }

    #[graphql(name = "deleteMotoGPRider")]
    async fn delete_moto_gp_rider(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<String> {
        clients(ctx)?
            .riders
            .delete(EntityId::from(id.0.clone()))
            .await
            .map_err(to_graphql_error)?;
        Ok(deleted_message(EntityKind::Rider, &id))
    }
}

/// Builds the schema with the clients available to every resolver.
#[must_use]
pub fn build_schema(clients: GatewayClients) -> GatewaySchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(clients)
        .finish()
}

pub async fn graphql_handler(State(state): State<GatewayState>, req: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

/// GraphiQL IDE pointed at `/graphql`.
pub async fn graphiql_handler() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}
