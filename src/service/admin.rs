use crate::schema::catalog::layer::Layer;
use crate::schema::exception::{ExceptionCode, ServiceException, ServiceFamily};
use crate::schema::request::{Request, RequestType};
use crate::schema::response::{DataStream, EmptyResponseDataStream, MessageDataStream};
use crate::service::interface::{MutationError, Service, ServiceContext};

use std::boxed::Box;
use std::result::Result;
use std::string::String;


const FAMILY: ServiceFamily = ServiceFamily::Admin;

pub struct AdminService;

impl Service for AdminService {
    fn family(&self) -> ServiceFamily {
        FAMILY
    }

    fn process_request(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        match request.request_type {
            RequestType::AddLayer => self.add_layer(request, context),
            RequestType::UpdateLayer => self.update_layer(request, context),
            RequestType::DeleteLayer => self.delete_layer(request, context),
            RequestType::BuildCapabilities => self.build_capabilities(context),
            RequestType::TurnOn => self.set_serving(context, true),
            RequestType::TurnOff => self.set_serving(context, false),
            _ => Err(ServiceException::new(
                FAMILY,
                ExceptionCode::OwsOperationNotSupported,
                String::from("Unknown admin request path"),
            )),
        }
    }
}

impl AdminService {
    fn add_layer(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let id = &request.path_params[0];
        let layer = parse_layer_body(id, request)?;
        context.admin.add_layer(layer).map_err(mutation_exception)?;
        context.capabilities.clear();
        info!("AdminService::add_layer - layer {} added", id);
        return Ok(status_stream("added", id));
    }

    fn update_layer(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let id = &request.path_params[0];
        let layer = parse_layer_body(id, request)?;
        context.admin.update_layer(layer).map_err(mutation_exception)?;
        context.capabilities.clear();
        info!("AdminService::update_layer - layer {} updated", id);
        return Ok(status_stream("updated", id));
    }

    fn delete_layer(
        &self,
        request: &Request,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        let id = &request.path_params[0];
        context.admin.delete_layer(id).map_err(mutation_exception)?;
        context.capabilities.clear();
        info!("AdminService::delete_layer - layer {} deleted", id);
        return Ok(status_stream("deleted", id));
    }

    fn build_capabilities(
        &self,
        context: &ServiceContext,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        context.capabilities.clear();
        return Ok(Box::new(MessageDataStream::ok_json(
            serde_json::json!({ "status": "capabilities invalidated" }).to_string(),
        )));
    }

    fn set_serving(
        &self,
        context: &ServiceContext,
        serving: bool,
    ) -> Result<Box<dyn DataStream>, ServiceException> {
        context.admin.set_serving(serving);
        info!("AdminService::set_serving - serving set to {}", serving);
        return Ok(Box::new(EmptyResponseDataStream));
    }
}

/// A failed parse never yields a partial layer, so nothing can leak into
/// the catalog from here.
fn parse_layer_body(id: &str, request: &Request) -> Result<Layer, ServiceException> {
    let body = match &request.body {
        Some(body) if !body.is_empty() => body,
        _ => {
            return Err(ServiceException::new(
                FAMILY,
                ExceptionCode::AdminBadRequest,
                String::from("A layer definition body is required"),
            ));
        },
    };
    Layer::from_json(id, body).map_err(|error| {
        ServiceException::new(FAMILY, ExceptionCode::AdminBadRequest, error.to_string())
    })
}

fn mutation_exception(error: MutationError) -> ServiceException {
    match error {
        MutationError::Conflict(id) => ServiceException::new(
            FAMILY,
            ExceptionCode::AdminConflict,
            format!("Layer {} already exists", id),
        ),
        MutationError::NotFound(id) => ServiceException::new(
            FAMILY,
            ExceptionCode::AdminNotFound,
            format!("Layer {} does not exist", id),
        ),
    }
}

fn status_stream(status: &str, id: &str) -> Box<dyn DataStream> {
    Box::new(MessageDataStream::ok_json(
        serde_json::json!({ "status": status, "layer": id }).to_string(),
    ))
}
