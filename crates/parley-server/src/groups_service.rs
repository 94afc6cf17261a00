//! `Groups` service: creation, membership, and administration.
//!
//! Every operation except Create runs the full admission pipeline and
//! then branches on where the group lives: local operands are
//! enforced against the permission matrix and mutated through the
//! repository; remote operands are forwarded to the owning peer with
//! the operator's identity attached, and the peer enforces its own
//! rules.
//!
//! Denials and missing groups both surface as the opaque `badGroup`
//! so callers cannot probe for a group's existence.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use parley_proto::groups_server::Groups;
use parley_proto::{
    DemoteRequest, InfoRequest, InviteRequest, JoinRequest, LeaveRequest, PromoteRequest,
};
use parley_store::Repository;
use parley_types::{identity, Group, GroupOp, ParleyError, Result};

use crate::admission::Metadata;
use crate::errors::{internal, to_status};
use crate::Core;

pub struct GroupsService<R> {
    core: Arc<Core<R>>,
}

impl<R> GroupsService<R> {
    pub fn new(core: Arc<Core<R>>) -> Self {
        Self { core }
    }
}

/// Maps a stored group onto the wire shape.
pub(crate) fn group_to_proto(group: Group) -> parley_proto::Group {
    parley_proto::Group {
        id: group.id,
        owners: group.owners,
        members: group.members,
        is_open: group.is_open,
        is_broadcast: group.is_broadcast,
    }
}

/// Maps a peer-returned group onto the domain shape.
pub(crate) fn group_from_proto(group: parley_proto::Group) -> Group {
    Group {
        id: group.id,
        owners: group.owners,
        members: group.members,
        is_open: group.is_open,
        is_broadcast: group.is_broadcast,
    }
}

impl<R: Repository> GroupsService<R> {
    /// Loads a local group, requiring both that the record exists and
    /// that the operator may perform `op` on it.
    async fn permitted_group(&self, id: &str, operator: &str, op: GroupOp) -> Result<Group> {
        let group = self.core.store.load_group(id).await.map_err(internal)?;
        if !group.exists() {
            return Err(ParleyError::BadGroup);
        }

        if !group.permits(operator, op) {
            return Err(ParleyError::BadGroup);
        }

        Ok(group)
    }
}

#[tonic::async_trait]
impl<R: Repository> Groups for GroupsService<R> {
    /// Mints a fresh group owned by the (local) operator.
    async fn create(
        &self,
        request: Request<parley_proto::Group>,
    ) -> std::result::Result<Response<parley_proto::Group>, Status> {
        let operator = self
            .core
            .authenticate(request.metadata())
            .await
            .map_err(to_status)?;
        self.core
            .validate_operator(&operator, request.get_ref())
            .map_err(to_status)?;

        // There is no operand to resolve: the group id does not exist
        // until minted below. Only users of this domain create here.
        if !operator.is_local {
            return Err(to_status(ParleyError::Input));
        }

        let req = request.into_inner();

        let id = self
            .core
            .minter
            .mint_group_id(&self.core.probe())
            .await
            .map_err(to_status)?;

        self.core
            .store
            .add_group(&id, &operator.id, req.is_open, req.is_broadcast)
            .await
            .map_err(|e| to_status(internal(e)))?;

        tracing::info!(group = %id, owner = %operator.id, "created group");

        Ok(Response::new(parley_proto::Group {
            id,
            owners: vec![operator.id.clone()],
            members: vec![operator.id],
            is_open: req.is_open,
            is_broadcast: req.is_broadcast,
        }))
    }

    async fn join(
        &self,
        request: Request<JoinRequest>,
    ) -> std::result::Result<Response<()>, Status> {
        let Metadata { operator, operand } = self
            .core
            .admit_federated(request.metadata(), request.get_ref())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        if !operand.is_local {
            let peer = operand.peer.as_ref().ok_or(to_status(ParleyError::NotPeered))?;
            peer.join_group(&operator.id, req).await?;
            return Ok(Response::new(()));
        }

        self.permitted_group(&req.group_id, &operator.id, GroupOp::Join)
            .await
            .map_err(to_status)?;

        self.core
            .store
            .join_group(&req.group_id, &operator.id)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }

    async fn info(
        &self,
        request: Request<InfoRequest>,
    ) -> std::result::Result<Response<parley_proto::Group>, Status> {
        let Metadata { operator, operand } = self
            .core
            .admit_federated(request.metadata(), request.get_ref())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        if !operand.is_local {
            let peer = operand.peer.as_ref().ok_or(to_status(ParleyError::NotPeered))?;
            let group = peer.group_info(&operator.id, req).await?;
            return Ok(Response::new(group));
        }

        let group = self
            .permitted_group(&req.group_id, &operator.id, GroupOp::Read)
            .await
            .map_err(to_status)?;

        Ok(Response::new(group_to_proto(group)))
    }

    async fn invite(
        &self,
        request: Request<InviteRequest>,
    ) -> std::result::Result<Response<()>, Status> {
        let Metadata { operator, operand } = self
            .core
            .admit_federated(request.metadata(), request.get_ref())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        if !operand.is_local {
            let peer = operand.peer.as_ref().ok_or(to_status(ParleyError::NotPeered))?;
            peer.invite_to_group(&operator.id, req).await?;
            return Ok(Response::new(()));
        }

        let mut group = self
            .permitted_group(&req.group_id, &operator.id, GroupOp::Modify)
            .await
            .map_err(to_status)?;

        // We can only vouch for invitees we are authoritative for;
        // remote invitees are taken on trust.
        let invitee_domain = identity::domain(&req.invitee).map_err(to_status)?;
        if invitee_domain == self.core.config.domain_name
            && !self.core.store.id_exists(&req.invitee).await
        {
            return Err(to_status(ParleyError::BadUser));
        }

        if group.members.iter().any(|m| m == &req.invitee) {
            return Ok(Response::new(()));
        }

        group.members.push(req.invitee);
        self.core
            .store
            .save_group(&group)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }

    async fn promote_user(
        &self,
        request: Request<PromoteRequest>,
    ) -> std::result::Result<Response<()>, Status> {
        let Metadata { operator, operand } = self
            .core
            .admit_federated(request.metadata(), request.get_ref())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        if !operand.is_local {
            let peer = operand.peer.as_ref().ok_or(to_status(ParleyError::NotPeered))?;
            peer.promote_user(&operator.id, req).await?;
            return Ok(Response::new(()));
        }

        let mut group = self
            .permitted_group(&req.group_id, &operator.id, GroupOp::Modify)
            .await
            .map_err(to_status)?;

        if group.owners.iter().any(|o| o == &req.promotee) {
            return Ok(Response::new(()));
        }

        if !group.members.iter().any(|m| m == &req.promotee) {
            return Err(to_status(ParleyError::BadUser));
        }

        group.owners.push(req.promotee);
        self.core
            .store
            .save_group(&group)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }

    async fn demote_user(
        &self,
        request: Request<DemoteRequest>,
    ) -> std::result::Result<Response<()>, Status> {
        let Metadata { operator, operand } = self
            .core
            .admit_federated(request.metadata(), request.get_ref())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        if !operand.is_local {
            let peer = operand.peer.as_ref().ok_or(to_status(ParleyError::NotPeered))?;
            peer.demote_user(&operator.id, req).await?;
            return Ok(Response::new(()));
        }

        let mut group = self
            .permitted_group(&req.group_id, &operator.id, GroupOp::Modify)
            .await
            .map_err(to_status)?;

        // Owners demote to members while still in the member set; a
        // demote on the last remaining set removes membership.
        if group.owners.iter().any(|o| o == &req.demotee) {
            group.owners.retain(|o| o != &req.demotee);
        } else if group.members.iter().any(|m| m == &req.demotee) {
            group.members.retain(|m| m != &req.demotee);
        } else {
            return Err(to_status(ParleyError::BadUser));
        }

        self.core
            .store
            .save_group(&group)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }

    async fn leave(
        &self,
        request: Request<LeaveRequest>,
    ) -> std::result::Result<Response<()>, Status> {
        let Metadata { operator, operand } = self
            .core
            .admit_federated(request.metadata(), request.get_ref())
            .await
            .map_err(to_status)?;
        let req = request.into_inner();

        if !operand.is_local {
            let peer = operand.peer.as_ref().ok_or(to_status(ParleyError::NotPeered))?;
            peer.leave_group(&operator.id, req).await?;
            return Ok(Response::new(()));
        }

        let group = self
            .permitted_group(&req.group_id, &operator.id, GroupOp::Leave)
            .await
            .map_err(to_status)?;

        let involved = group.owners.iter().any(|o| o == &operator.id)
            || group.members.iter().any(|m| m == &operator.id);
        if !involved {
            return Err(to_status(ParleyError::BadGroup));
        }

        self.core
            .store
            .remove_from_group(&req.group_id, &operator.id)
            .await
            .map_err(|e| to_status(internal(e)))?;

        Ok(Response::new(()))
    }
}
